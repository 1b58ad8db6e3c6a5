//! Strata IPC messages and the Stream container protocol.
//!
//! Strata serializes record batches into a sequence of length-prefixed,
//! self-describing messages: a metadata section tagged with a header kind
//! and format version, followed by an 8-byte-aligned body holding the raw
//! column buffers. The same per-message codec underlies both the
//! sequential [`stream`] protocol defined here and the random-access File
//! container in `strata-file`.
//!
//! The crate provides in-memory message representations, an incremental
//! [`messages::MessageDecoder`] that can be fed bytes as they arrive, and
//! synchronous readers and writers over any [`std::io::Read`] /
//! [`std::io::Write`].

pub mod batch;
pub mod dictionary;
pub mod messages;
pub mod schema;
pub mod stream;
pub mod tensor;
pub mod wire;

use strata_error::{StrataResult, strata_err};

/// Message bodies and every buffer within them start at multiples of this.
pub const ALIGNMENT: usize = 8;

/// The size of the metadata length prefix, in bytes.
pub const MESSAGE_PREFIX_LENGTH: usize = 4;

/// The default bound on type-tree nesting, applied to both encoding and
/// decoding unless a caller overrides it.
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 256;

/// Fail with [`RecursionLimitExceeded`][strata_error::StrataError] once
/// `depth` passes `limit`.
///
/// Every recursive step of the schema and batch codecs threads its depth
/// through this check, so nesting is bounded no matter what arrives on the
/// wire.
pub(crate) fn check_depth(depth: usize, limit: usize) -> StrataResult<()> {
    if depth > limit {
        return Err(strata_err!(RecursionLimit: depth, limit));
    }
    Ok(())
}

/// Options for encoding record batches and schemas.
#[derive(Debug, Clone)]
pub struct WriteOptions {
    /// Permit row counts and buffer lengths beyond `i32::MAX`. Only the
    /// File writer's large-batch path sets this; the single-shot message
    /// path cannot represent such batches.
    pub allow_64bit: bool,
    /// The nesting bound for this session.
    pub max_depth: usize,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            allow_64bit: false,
            max_depth: DEFAULT_MAX_RECURSION_DEPTH,
        }
    }
}

impl WriteOptions {
    /// Options with a custom nesting bound.
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            max_depth,
            ..Default::default()
        }
    }
}

/// Options for decoding messages.
#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// The nesting bound for this session. Decoding enforces the reader's
    /// own bound regardless of what the writer used.
    pub max_depth: usize,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_RECURSION_DEPTH,
        }
    }
}

impl ReadOptions {
    /// Options with a custom nesting bound.
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self { max_depth }
    }
}
