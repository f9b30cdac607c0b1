//! Caller-correlation tokens.
//!
//! The source compares tokens by object identity (`token = object()`); a
//! systems rewrite can't carry that forward directly, so auto-generated
//! tokens draw from a process-wide monotonic counter and caller-supplied
//! tokens are accepted as any `u64` and compared by value. Value equality
//! coincides with identity here since a `u64` is `Copy` and the caller is
//! responsible for not reusing one still active (see [`DuplicateToken`]).
//!
//! [`DuplicateToken`]: crate::error::CallerError::DuplicateToken

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_AUTO_TOKEN: AtomicU64 = AtomicU64::new(1);

/// An opaque caller-correlation handle.
///
/// Returned by `submit_write`/`submit_read` and used to retrieve the
/// matching result later via `poll_ready`/`take_result`/`await_result`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(u64);

impl Token {
    /// Wraps a caller-chosen identity as a token.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Generates a fresh token from the process-wide auto-token counter.
    ///
    /// Auto-tokens start at 1 and never reuse a value within a process
    /// lifetime, so they can never collide with themselves; they could in
    /// principle collide with a caller-supplied token that happens to equal
    /// the counter's current value; callers who want a guaranteed-disjoint
    /// namespace should use caller-supplied tokens exclusively.
    #[must_use]
    pub fn new_auto() -> Self {
        Self(NEXT_AUTO_TOKEN.fetch_add(1, Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_tokens_are_unique() {
        let a = Token::new_auto();
        let b = Token::new_auto();
        assert_ne!(a, b);
    }

    #[test]
    fn caller_tokens_compare_by_value() {
        assert_eq!(Token::new(42), Token::new(42));
        assert_ne!(Token::new(42), Token::new(43));
    }
}
