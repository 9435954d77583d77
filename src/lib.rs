#![deny(clippy::all, clippy::pedantic)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![cfg_attr(
    test,
    allow(
        clippy::useless_vec,
        clippy::uninlined_format_args,
        clippy::cast_possible_truncation,
        clippy::float_cmp,
        clippy::cast_precision_loss
    )
)]
#![allow(clippy::module_name_repetitions)]
//
// Documentation lints: internal helpers are self-describing; public entry
// points carry their own docs.
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
//
// Casts are bounded by on-disk format limits (u32 record lengths, u64 offsets).
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
//
#![allow(clippy::too_many_lines)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::similar_names)]
#![allow(clippy::manual_let_else)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::needless_pass_by_value)] // Builders take owned values
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::format_push_string)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::default_trait_access)]
#![allow(clippy::field_reassign_with_default)]
#![allow(clippy::unreadable_literal)] // Magic numbers in binary formats are clearer as hex
#![allow(clippy::implicit_hasher)]
#![allow(clippy::len_without_is_empty)]
#![allow(clippy::unnecessary_wraps)]

//! Chemical-name normalization and schema reconciliation for extracted
//! scientific records.
//!
//! Raw chemical names pulled out of papers are normalized, resolved to
//! canonical identifiers (curated synonyms, an on-disk [`ReferenceIndex`], a
//! persistent [`ResolutionCache`] and an external [`CompoundSource`] such as
//! PubChem), merged back into the document and validated against a JSON
//! Schema by the [`SchemaReconciler`]. [`Normalizer`] wires the pieces
//! together.

/// The chemlink-core crate version (matches `Cargo.toml`).
pub const CHEMLINK_CORE_VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cache;
pub mod config;
pub mod constants;
pub mod document;
pub mod error;
pub mod index;
pub(crate) mod io;
pub mod pipeline;
pub mod pubchem;
pub mod reconcile;
pub mod resolver;
pub mod text;
pub mod types;

pub use cache::{CacheStats, ResolutionCache};
pub use config::NormalizationConfig;
pub use document::{ExtractionDocument, FieldPath, PathSegment};
pub use error::{ChemlinkError, Result};
pub use index::{
    ChemicalLookup, DatasetFormat, IndexBuildStats, IndexBuilder, IndexStats, MemoryIndex,
    ReferenceIndex,
};
pub use pipeline::{NormalizationPlan, NormalizedDocument, Normalizer};
#[cfg(feature = "pubchem")]
pub use pubchem::PubChemClient;
pub use pubchem::{Candidate, CompoundSource, LookupError};
pub use reconcile::{SchemaReconciler, clean_document};
pub use resolver::{Resolver, ResolverBuilder};
pub use text::{name_similarity, normalize_name};
pub use types::{
    CacheOptions, ChemicalRecord, CleanOptions, FieldError, IndexOpenOptions, PubChemOptions,
    ReconcilerOptions, ResolutionEntry, ResolutionSource, ResolutionStatus, ResolverOptions,
    ReviewItem, SearchMode, ValidationReport,
};

use bincode::config::Config;

/// Bincode configuration shared by the index and cache formats.
pub(crate) fn record_config() -> impl Config {
    bincode::config::standard()
        .with_fixed_int_encoding()
        .with_little_endian()
}
