//! System-wide constants for the custody ledger.

/// Maximum length of a product identifier, in bytes.
pub const MAX_PRODUCT_ID_BYTES: usize = 128;

/// Maximum length of any free-text field (name, manufacturer, locations, notes).
pub const MAX_TEXT_FIELD_BYTES: usize = 1024;

/// Default timeout applied by clients to every ledger call, in milliseconds.
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 30_000;

/// Domain separator mixed into every call's signing bytes.
pub const CALL_SIGNING_DOMAIN: &[u8] = b"custody:call:v1:";

/// Domain separator for journal entry hashes.
pub const JOURNAL_HASH_DOMAIN: &[u8] = b"custody:journal:v1:";

/// `prev_hash` of the first journal entry.
pub const JOURNAL_GENESIS_HASH: [u8; 32] = [0u8; 32];

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
