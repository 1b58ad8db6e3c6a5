//! Error handling for the Strata crates.
//!
//! All fallible Strata operations return [`StrataResult`]. Errors are
//! constructed through the [`strata_err`] and [`strata_bail`] macros, which
//! take the target variant as a prefix, e.g.
//! `strata_bail!(InvalidFormat: "bad magic {:?}", found)`.

use std::fmt::Display;

/// A `Result` specialized to [`StrataError`].
pub type StrataResult<T> = Result<T, StrataError>;

/// The error taxonomy shared by every Strata crate.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StrataError {
    /// Malformed or corrupt wire bytes: bad magic, truncated metadata,
    /// unknown tags, unresolved dictionary ids.
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// A type tree or batch metadata nests deeper than the active limit.
    #[error("recursion limit exceeded: depth {depth} > limit {limit}")]
    RecursionLimitExceeded {
        /// The depth at which the walk was abandoned.
        depth: usize,
        /// The limit in force when the walk was abandoned.
        limit: usize,
    },

    /// In-memory data that this code path cannot serialize, e.g. a
    /// non-contiguous tensor or a 64-bit-sized batch on the 32-bit path.
    #[error("unsupported layout: {0}")]
    UnsupportedLayout(String),

    /// API misuse: mismatched column lengths, writes after close, etc.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An underlying sink or source failure, propagated unchanged.
    #[error("io error: {0}")]
    IO(#[from] std::io::Error),
}

/// Construct a [`StrataError`], without returning it.
#[macro_export]
macro_rules! strata_err {
    (InvalidFormat: $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::StrataError::InvalidFormat(format!($fmt $(, $arg)*))
    };
    (UnsupportedLayout: $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::StrataError::UnsupportedLayout(format!($fmt $(, $arg)*))
    };
    (RecursionLimit: $depth:expr, $limit:expr) => {
        $crate::StrataError::RecursionLimitExceeded { depth: $depth, limit: $limit }
    };
    ($fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::StrataError::InvalidArgument(format!($fmt $(, $arg)*))
    };
}

/// Return early with a [`StrataError`].
#[macro_export]
macro_rules! strata_bail {
    ($($tt:tt)+) => {
        return Err($crate::strata_err!($($tt)+))
    };
}

/// Panic with a formatted message.
///
/// Reserved for unrecoverable invariant violations; recoverable conditions
/// go through [`strata_bail`].
#[macro_export]
macro_rules! strata_panic {
    ($fmt:literal $(, $arg:expr)* $(,)?) => {
        panic!($fmt $(, $arg)*)
    };
}

/// Unwrap a value whose failure would indicate a broken internal invariant,
/// with a message describing the invariant.
pub trait StrataExpect {
    /// The unwrapped type.
    type Output;

    /// Unwrap, panicking with `msg` on failure.
    fn strata_expect(self, msg: &str) -> Self::Output;
}

impl<T> StrataExpect for Option<T> {
    type Output = T;

    fn strata_expect(self, msg: &str) -> T {
        match self {
            Some(value) => value,
            None => strata_panic!("expected Some: {}", msg),
        }
    }
}

impl<T, E: Display> StrataExpect for Result<T, E> {
    type Output = T;

    fn strata_expect(self, msg: &str) -> T {
        match self {
            Ok(value) => value,
            Err(e) => strata_panic!("expected Ok: {}: {}", msg, e),
        }
    }
}

/// Unwrap a result whose error type converts into [`StrataError`],
/// panicking with the converted error's display form.
pub trait StrataUnwrap {
    /// The unwrapped type.
    type Output;

    /// Unwrap, panicking with the error's message on failure.
    fn strata_unwrap(self) -> Self::Output;
}

impl<T, E: Into<StrataError>> StrataUnwrap for Result<T, E> {
    type Output = T;

    fn strata_unwrap(self) -> T {
        match self {
            Ok(value) => value,
            Err(e) => {
                let err: StrataError = e.into();
                strata_panic!("{}", err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fails(limit: usize) -> StrataResult<()> {
        strata_bail!(RecursionLimit: limit + 1, limit)
    }

    #[test]
    fn variant_prefixes() {
        let e = strata_err!(InvalidFormat: "bad magic {:?}", [0u8; 4]);
        assert!(matches!(e, StrataError::InvalidFormat(_)));
        assert!(e.to_string().starts_with("invalid format"));

        let e = strata_err!(UnsupportedLayout: "row count {}", 3_000_000_000u64);
        assert!(matches!(e, StrataError::UnsupportedLayout(_)));

        let e = strata_err!("column {} length mismatch", 2);
        assert!(matches!(e, StrataError::InvalidArgument(_)));
    }

    #[test]
    fn recursion_limit_carries_context() {
        let e = fails(256).unwrap_err();
        assert_eq!(
            e.to_string(),
            "recursion limit exceeded: depth 257 > limit 256"
        );
    }

    #[test]
    #[should_panic(expected = "short read")]
    fn strata_unwrap_panics_with_the_error_message() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read");
        let result: Result<(), std::io::Error> = Err(io);
        result.strata_unwrap();
    }

    #[test]
    fn io_errors_propagate_unchanged() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read");
        let e = StrataError::from(io);
        assert!(matches!(e, StrataError::IO(_)));
        assert!(e.to_string().contains("short read"));
    }
}
