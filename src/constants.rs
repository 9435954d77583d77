//! Format constants and tuning defaults.

/// Magic bytes opening every reference index file.
pub const INDEX_MAGIC: [u8; 4] = *b"CHIX";
/// On-disk reference index format version.
pub const INDEX_VERSION: u32 = 1;
/// Fixed size of the reference index header.
pub const INDEX_HEADER_SIZE: usize = 96;
/// Fixed size of one slot in the sorted key table.
pub const INDEX_SLOT_SIZE: usize = 24;

/// Magic prefix of every resolution-cache log record.
pub const CACHE_RECORD_MAGIC: u32 = 0x4352_4331; // "CRC1"
/// Upper bound on a single cache record payload; anything larger is a torn write.
pub const MAX_CACHE_RECORD_BYTES: u32 = 1024 * 1024;

/// Upper bound on a single encoded chemical record inside the index.
pub const MAX_INDEX_RECORD_BYTES: u32 = 16 * 1024 * 1024;

/// Progress is logged every this many dataset rows during an index build.
pub const BUILD_LOG_INTERVAL: usize = 100_000;

/// Minimum `normalized_levenshtein` similarity accepted as a fuzzy match.
pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.85;
/// Default number of concurrent resolution workers.
pub const DEFAULT_RESOLVER_WORKERS: usize = 4;

pub const DEFAULT_PUBCHEM_BASE_URL: &str = "https://pubchem.ncbi.nlm.nih.gov/rest/pug";
pub const DEFAULT_PUBCHEM_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_PUBCHEM_MAX_RETRIES: u32 = 3;
pub const DEFAULT_PUBCHEM_BACKOFF_MS: u64 = 250;

/// Sentinel the extraction prompts emit for values absent from the paper.
pub const NOT_FOUND_SENTINEL: &str = "Not Found";

/// Keys written into a reconciled chemical field.
pub const FIELD_RAW_TEXT: &str = "raw_text";
pub const FIELD_CANONICAL_IDENTIFIER: &str = "canonical_identifier";
pub const FIELD_CANONICAL_NAME: &str = "canonical_name";
pub const FIELD_NEEDS_REVIEW: &str = "needs_review";
