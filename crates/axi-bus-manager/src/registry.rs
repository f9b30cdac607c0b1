//! Token-indexed result registry shared by both engines.
//!
//! A request's lifecycle moves through this registry: `begin` registers the
//! token as in flight, `complete` stores the finished result, and the caller
//! retrieves it via `poll_ready`/`take_result`/`await_result`. `wait_idle`
//! lets a caller block until every registered token has been delivered.

use std::collections::HashMap;
use std::sync::{Condvar, Mutex};

use crate::error::CallerError;
use crate::model::{EngineStopped, RequestState, WithToken};
use crate::token::Token;

struct Inner<R> {
    states: HashMap<Token, RequestState>,
    results: HashMap<Token, R>,
    in_flight: usize,
}

/// A token-indexed store of in-flight and completed results.
///
/// Generic over the result type so one implementation serves both
/// [`crate::model::WriteResult`] and [`crate::model::ReadResult`].
pub struct Registry<R> {
    inner: Mutex<Inner<R>>,
    /// Notified whenever a result is completed, or `in_flight` reaches zero.
    changed: Condvar,
}

impl<R: WithToken> Registry<R> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                states: HashMap::new(),
                results: HashMap::new(),
                in_flight: 0,
            }),
            changed: Condvar::new(),
        }
    }

    /// Registers `token` as newly submitted.
    ///
    /// # Errors
    ///
    /// Returns [`CallerError::DuplicateToken`] if `token` is already
    /// in-flight or awaiting retrieval.
    ///
    /// # Panics
    ///
    /// Panics if the registry's mutex is poisoned.
    pub fn begin(&self, token: Token) -> Result<(), CallerError> {
        let mut guard = self.inner.lock().expect("registry mutex poisoned");
        if guard.states.contains_key(&token) {
            return Err(CallerError::DuplicateToken(token));
        }
        guard.states.insert(token, RequestState::Submitted);
        guard.in_flight += 1;
        Ok(())
    }

    /// Advances `token`'s recorded state. No-op if `token` isn't registered
    /// (it may already have been delivered and forgotten).
    ///
    /// # Panics
    ///
    /// Panics if the registry's mutex is poisoned.
    pub fn set_state(&self, token: Token, state: RequestState) {
        let mut guard = self.inner.lock().expect("registry mutex poisoned");
        if let Some(slot) = guard.states.get_mut(&token) {
            *slot = state;
        }
    }

    /// Stores `result` as complete and wakes any callers waiting on it, or
    /// on idleness.
    ///
    /// # Panics
    ///
    /// Panics if the registry's mutex is poisoned.
    pub fn complete(&self, result: R) {
        let token = result.token();
        let mut guard = self.inner.lock().expect("registry mutex poisoned");
        guard.states.insert(token, RequestState::Completed);
        guard.results.insert(token, result);
        guard.in_flight = guard.in_flight.saturating_sub(1);
        drop(guard);
        self.changed.notify_all();
    }

    /// Returns `token`'s current lifecycle state, if it is still registered.
    ///
    /// # Panics
    ///
    /// Panics if the registry's mutex is poisoned.
    #[must_use]
    pub fn poll_state(&self, token: Token) -> Option<RequestState> {
        let guard = self.inner.lock().expect("registry mutex poisoned");
        guard.states.get(&token).copied()
    }

    /// Returns whether `token`'s result is ready to take, without blocking.
    ///
    /// # Panics
    ///
    /// Panics if the registry's mutex is poisoned.
    #[must_use]
    pub fn poll_ready(&self, token: Token) -> bool {
        let guard = self.inner.lock().expect("registry mutex poisoned");
        guard.results.contains_key(&token)
    }

    /// Removes and returns `token`'s result if it is ready, without blocking.
    ///
    /// # Panics
    ///
    /// Panics if the registry's mutex is poisoned.
    pub fn take_result(&self, token: Token) -> Option<R> {
        let mut guard = self.inner.lock().expect("registry mutex poisoned");
        let result = guard.results.remove(&token);
        if result.is_some() {
            guard.states.remove(&token);
        }
        result
    }

    /// Blocks the calling thread until `token`'s result is ready, then
    /// removes and returns it.
    ///
    /// # Panics
    ///
    /// Panics if the registry's mutex is poisoned while waiting.
    pub fn await_result(&self, token: Token) -> R {
        let guard = self.inner.lock().expect("registry mutex poisoned");
        let mut guard = self
            .changed
            .wait_while(guard, |inner| !inner.results.contains_key(&token))
            .expect("registry mutex poisoned while waiting");
        let result = guard
            .results
            .remove(&token)
            .expect("condvar predicate guarantees presence");
        guard.states.remove(&token);
        result
    }

    /// Returns whether no request is currently in flight (submitted but not
    /// yet completed).
    ///
    /// # Panics
    ///
    /// Panics if the registry's mutex is poisoned.
    #[must_use]
    pub fn idle(&self) -> bool {
        let guard = self.inner.lock().expect("registry mutex poisoned");
        guard.in_flight == 0
    }

    /// Blocks the calling thread until no request is in flight.
    ///
    /// # Panics
    ///
    /// Panics if the registry's mutex is poisoned while waiting.
    pub fn wait_idle(&self) {
        let guard = self.inner.lock().expect("registry mutex poisoned");
        let _guard = self
            .changed
            .wait_while(guard, |inner| inner.in_flight != 0)
            .expect("registry mutex poisoned while waiting");
    }
}

impl<R: WithToken> Default for Registry<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: WithToken + EngineStopped> Registry<R> {
    /// Fails every token currently in flight (registered but not yet
    /// completed) and wakes any blocked waiters.
    ///
    /// A fault site calls this right before it panics its own thread, so a
    /// caller already parked in `await_result`/`wait_idle` on this engine
    /// observes [`CallerError::EngineStopped`](crate::error::CallerError::EngineStopped)
    /// instead of hanging forever once the issue or response thread dies.
    ///
    /// # Panics
    ///
    /// Panics if the registry's mutex is poisoned.
    pub fn fail_all_in_flight(&self) {
        let mut guard = self.inner.lock().expect("registry mutex poisoned");
        let tokens: Vec<Token> = guard
            .states
            .keys()
            .copied()
            .filter(|token| !guard.results.contains_key(token))
            .collect();
        for token in tokens {
            guard.states.insert(token, RequestState::Completed);
            guard.results.insert(token, R::engine_stopped(token));
            guard.in_flight = guard.in_flight.saturating_sub(1);
        }
        drop(guard);
        self.changed.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ResponseCode;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct StubResult {
        token: Token,
        value: u32,
    }

    impl WithToken for StubResult {
        fn token(&self) -> Token {
            self.token
        }
    }

    impl EngineStopped for StubResult {
        fn engine_stopped(token: Token) -> Self {
            StubResult { token, value: u32::MAX }
        }
    }

    #[test]
    fn begin_then_complete_then_take_round_trips() {
        let registry: Registry<StubResult> = Registry::new();
        let token = Token::new(1);
        registry.begin(token).unwrap();
        assert_eq!(registry.poll_state(token), Some(RequestState::Submitted));
        assert!(!registry.poll_ready(token));

        registry.complete(StubResult { token, value: 7 });
        assert!(registry.poll_ready(token));
        assert_eq!(registry.take_result(token), Some(StubResult { token, value: 7 }));
        assert_eq!(registry.take_result(token), None);
    }

    #[test]
    fn token_is_reusable_once_its_result_has_been_taken() {
        let registry: Registry<StubResult> = Registry::new();
        let token = Token::new(1);
        registry.begin(token).unwrap();
        registry.complete(StubResult { token, value: 1 });
        registry.take_result(token).unwrap();

        // The same token id is free to reuse once its result has been taken.
        registry.begin(token).unwrap();
        assert_eq!(registry.poll_state(token), Some(RequestState::Submitted));
    }

    #[test]
    fn duplicate_begin_is_rejected() {
        let registry: Registry<StubResult> = Registry::new();
        let token = Token::new(1);
        registry.begin(token).unwrap();
        assert_eq!(registry.begin(token), Err(CallerError::DuplicateToken(token)));
    }

    #[test]
    fn idle_tracks_in_flight_count() {
        let registry: Registry<StubResult> = Registry::new();
        assert!(registry.idle());
        let token = Token::new(1);
        registry.begin(token).unwrap();
        assert!(!registry.idle());
        registry.complete(StubResult { token, value: 0 });
        assert!(registry.idle());
    }

    #[test]
    fn await_result_blocks_until_completion() {
        let registry = Arc::new(Registry::<StubResult>::new());
        let token = Token::new(9);
        registry.begin(token).unwrap();

        let waiter = Arc::clone(&registry);
        let handle = thread::spawn(move || waiter.await_result(token));

        thread::sleep(Duration::from_millis(20));
        registry.complete(StubResult { token, value: 42 });

        assert_eq!(handle.join().unwrap(), StubResult { token, value: 42 });
    }

    #[test]
    fn wait_idle_blocks_until_every_request_completes() {
        let registry = Arc::new(Registry::<StubResult>::new());
        let a = Token::new(1);
        let b = Token::new(2);
        registry.begin(a).unwrap();
        registry.begin(b).unwrap();

        let waiter = Arc::clone(&registry);
        let handle = thread::spawn(move || waiter.wait_idle());

        registry.complete(StubResult { token: a, value: 0 });
        thread::sleep(Duration::from_millis(20));
        registry.complete(StubResult {
            token: b,
            value: ResponseCode::Okay as u32,
        });

        handle.join().unwrap();
        assert!(registry.idle());
    }

    #[test]
    fn fail_all_in_flight_wakes_waiters_and_completes_results() {
        let registry = Arc::new(Registry::<StubResult>::new());
        let a = Token::new(1);
        let b = Token::new(2);
        registry.begin(a).unwrap();
        registry.begin(b).unwrap();

        let waiter = Arc::clone(&registry);
        let handle = thread::spawn(move || waiter.await_result(a));

        thread::sleep(Duration::from_millis(20));
        registry.fail_all_in_flight();

        assert_eq!(handle.join().unwrap(), StubResult { token: a, value: u32::MAX });
        assert_eq!(registry.take_result(b), Some(StubResult { token: b, value: u32::MAX }));
        assert!(registry.idle());
    }

    #[test]
    fn fail_all_in_flight_leaves_already_completed_results_untouched() {
        let registry: Registry<StubResult> = Registry::new();
        let token = Token::new(3);
        registry.begin(token).unwrap();
        registry.complete(StubResult { token, value: 7 });

        registry.fail_all_in_flight();

        assert_eq!(registry.take_result(token), Some(StubResult { token, value: 7 }));
    }
}
