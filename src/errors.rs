//! The error taxonomy.  Every variant is fatal to the current invocation;
//! recovery is re-running, which resumes from the last cached state.

use crate::hash::Fingerprint;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("dependency cycle: {0}")]
    CycleDetected(String),

    #[error("unknown step \"{0}\"")]
    UnknownStep(String),

    #[error("cache i/o failed: {0}")]
    CacheIo(String),

    #[error("command failed: {0}")]
    ActionFailed(String),

    #[error("dependency scan failed for {0}")]
    ScanFailed(String),

    #[error("hash mismatch: expected {expected} got {actual}")]
    HashMismatch {
        expected: Fingerprint,
        actual: Fingerprint,
    },

    #[error("option \"{key}\": invalid {kind} value {value:?}")]
    OptionParse {
        key: String,
        kind: &'static str,
        value: String,
    },

    #[error("cannot add {0} after the configure phase ended")]
    LateMutation(String),

    #[error("failed to recompile the configure binary")]
    RecompileFailed,
}
