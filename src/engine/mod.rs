// Soul memory engine.
// Archive (hash-chained event log) and Graph (weighted beliefs) are the two
// durable stores; everything else is a pipeline over them.

pub mod archive;
pub mod circulation;
pub mod compiler;
pub mod config;
pub mod convergence;
pub mod graph;
pub mod paths;
pub mod recall;
pub mod weights;

/// Current UTC time in the archive's fixed-width timestamp format.
pub(crate) fn now_timestamp() -> String {
    chrono::Utc::now()
        .format(crate::atoms::constants::TIMESTAMP_FORMAT)
        .to_string()
}

/// Lowercase hex SHA-256 of `input`.
pub(crate) fn sha256_hex(input: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(input);
    format!("{:x}", hasher.finalize())
}
