//! Statistical engines. All of them are pure functions of a `&Dataset`.

pub mod aggregate;
pub mod correlation;
pub mod descriptive;
pub mod outliers;
pub mod regression;

pub use aggregate::{Binning, Histogram, Overview, distribution, frequency, group_stats, overview};
pub use correlation::{CorrelationCell, CorrelationMatrix, CorrelationPair, correlate};
pub use descriptive::{SummaryStat, round_to, summarize};
pub use outliers::{OutlierRecord, OutlierReport, detect};
pub use regression::{Coefficient, ModelSpec, RegressionResult, fit, model_summary};
