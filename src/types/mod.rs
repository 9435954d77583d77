//! Public types exposed by the `chemlink-core` crate.

pub mod options;
pub mod record;
pub mod report;
pub mod resolution;

pub use options::{
    CacheOptions, CleanOptions, IndexOpenOptions, PubChemOptions, ReconcilerOptions,
    ResolverOptions, SearchMode,
};
pub use record::ChemicalRecord;
pub use report::{FieldError, ReviewItem, ValidationReport};
pub use resolution::{ResolutionEntry, ResolutionSource, ResolutionStatus};
