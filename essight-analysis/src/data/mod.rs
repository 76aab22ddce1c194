//! Survey data: catalog, loading, cleaning, and the published snapshot.

pub mod catalog;
pub mod clean;
pub mod dataset;
pub mod source;
pub mod store;

pub use catalog::{Catalog, VariableKind, VariableSpec};
pub use clean::{CleaningReport, clean};
pub use dataset::{Cell, Dataset, Observation};
pub use source::{SourceInfo, load};
pub use store::{DatasetSnapshot, DatasetStore};
