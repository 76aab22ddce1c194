//! Response contract and the assembler that fills it.

pub mod assemble;
pub mod contract;

pub use assemble::{
    RegressionAnalysis, country_response, demographics_response, distributions_response,
    overview_response, scatter_response,
};
pub use contract::*;
