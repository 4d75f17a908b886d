//! Passcode and session management.
//!
//! A node shows a 4-digit passcode on its screen.  A browser on another
//! device submits that passcode to `/api/login`; on success it receives an
//! opaque bearer token which it presents on every gated request.
//!
//! # Session model
//!
//! Sessions are keyed by a freshly minted UUID v4 token, never by the
//! caller's network address.  Address-keyed sessions would let every device
//! behind the same NAT share one login, and would break when a phone hops
//! between Wi-Fi and mobile data.  The cost is that clients must keep the
//! token and resend it.
//!
//! # Rotation
//!
//! Exactly one passcode is authoritative at any instant.  Rotation replaces
//! it in one step and, by default, leaves existing sessions alone; callers
//! that want rotation to log everybody out call [`AuthState::revoke_all_sessions`]
//! afterwards.
//!
//! Sessions never expire on their own.  To keep memory bounded, at most
//! [`MAX_SESSIONS`] are held; past that, each new login evicts the oldest.

use std::collections::{HashMap, VecDeque};
use std::time::SystemTime;

use rand::Rng;
use thiserror::Error;
use uuid::Uuid;

/// Number of digits in every passcode.
pub const PASSCODE_DIGITS: usize = 4;

/// Default upper bound on concurrently valid sessions.
pub const MAX_SESSIONS: usize = 1024;

/// Errors produced by passcode validation and login.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// The supplied passcode does not match the active one.
    #[error("wrong passcode")]
    WrongPasscode,

    /// A passcode value was not exactly four ASCII digits.
    #[error("passcode must be exactly {} ASCII digits, got {0:?}", PASSCODE_DIGITS)]
    InvalidFormat(String),
}

/// The active 4-digit passcode together with the time it was issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Passcode {
    value: String,
    issued_at: SystemTime,
}

impl Passcode {
    /// Validates `value` and wraps it as a passcode issued now.
    ///
    /// Leading zeros are allowed (`"0042"` is valid).
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidFormat`] unless `value` is exactly
    /// [`PASSCODE_DIGITS`] ASCII digits.
    pub fn parse(value: &str) -> Result<Self, AuthError> {
        if value.len() != PASSCODE_DIGITS || !value.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AuthError::InvalidFormat(value.to_string()));
        }
        Ok(Self {
            value: value.to_string(),
            issued_at: SystemTime::now(),
        })
    }

    /// Draws a uniformly random passcode from `rng`.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let n: u16 = rng.gen_range(0..10_000);
        Self {
            value: format!("{n:04}"),
            issued_at: SystemTime::now(),
        }
    }

    /// The passcode digits.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// When this passcode became active.
    pub fn issued_at(&self) -> SystemTime {
        self.issued_at
    }
}

/// Proof of a successful login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Bearer token handed to the client.
    pub token: Uuid,
    /// When the session was created.  Sessions do not expire.
    pub created_at: SystemTime,
}

/// Owns the current passcode and every valid session.
#[derive(Debug)]
pub struct AuthState {
    passcode: Passcode,
    sessions: HashMap<Uuid, Session>,
    /// Tokens oldest first.
    issued: VecDeque<Uuid>,
    session_limit: usize,
}

impl AuthState {
    /// Creates auth state with a random passcode from the thread-local RNG.
    pub fn new() -> Self {
        Self::with_passcode(Passcode::generate(&mut rand::thread_rng()))
    }

    /// Creates auth state with a specific passcode and no sessions.
    pub fn with_passcode(passcode: Passcode) -> Self {
        Self {
            passcode,
            sessions: HashMap::new(),
            issued: VecDeque::new(),
            session_limit: MAX_SESSIONS,
        }
    }

    /// Overrides [`MAX_SESSIONS`].  A limit of zero is treated as one.
    pub fn with_session_limit(mut self, limit: usize) -> Self {
        self.session_limit = limit.max(1);
        self
    }

    /// The active passcode.
    pub fn passcode(&self) -> &Passcode {
        &self.passcode
    }

    /// Replaces the passcode with a fresh random value.
    ///
    /// The new value always differs from the previous one.
    pub fn rotate_passcode(&mut self) -> &Passcode {
        self.rotate_passcode_with(&mut rand::thread_rng())
    }

    /// Same as [`rotate_passcode`](Self::rotate_passcode) with an explicit RNG.
    pub fn rotate_passcode_with<R: Rng + ?Sized>(&mut self, rng: &mut R) -> &Passcode {
        let next = loop {
            let candidate = Passcode::generate(rng);
            if candidate.value != self.passcode.value {
                break candidate;
            }
        };
        self.passcode = next;
        &self.passcode
    }

    /// Replaces the passcode with a caller-chosen value.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidFormat`] if `value` is not four digits; the
    /// current passcode is left untouched in that case.
    pub fn set_passcode(&mut self, value: &str) -> Result<&Passcode, AuthError> {
        self.passcode = Passcode::parse(value)?;
        Ok(&self.passcode)
    }

    /// Checks `supplied` against the active passcode and mints a session.
    ///
    /// Repeated correct logins always succeed, each with its own token.  When
    /// the session limit is reached the oldest session is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::WrongPasscode`] on mismatch.  A failed login
    /// performs no mutation.
    pub fn login(&mut self, supplied: &str) -> Result<Session, AuthError> {
        if supplied != self.passcode.value {
            return Err(AuthError::WrongPasscode);
        }
        let session = Session {
            token: Uuid::new_v4(),
            created_at: SystemTime::now(),
        };
        while self.sessions.len() >= self.session_limit {
            match self.issued.pop_front() {
                Some(oldest) => {
                    self.sessions.remove(&oldest);
                }
                None => break,
            }
        }
        self.sessions.insert(session.token, session.clone());
        self.issued.push_back(session.token);
        Ok(session)
    }

    /// Returns `true` if `token` names a stored session.
    ///
    /// Tokens that are not valid UUIDs are simply unauthenticated.
    pub fn is_authenticated(&self, token: &str) -> bool {
        Uuid::parse_str(token.trim())
            .map(|t| self.sessions.contains_key(&t))
            .unwrap_or(false)
    }

    /// Drops every session.  Used when rotation is configured to log clients out.
    pub fn revoke_all_sessions(&mut self) {
        self.sessions.clear();
        self.issued.clear();
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

impl Default for AuthState {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn state_with(value: &str) -> AuthState {
        AuthState::with_passcode(Passcode::parse(value).unwrap())
    }

    #[test]
    fn test_generated_passcode_is_four_ascii_digits() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let p = Passcode::generate(&mut rng);
            assert_eq!(p.value().len(), 4);
            assert!(p.value().bytes().all(|b| b.is_ascii_digit()));
        }
    }

    #[test]
    fn test_parse_accepts_leading_zeros() {
        let p = Passcode::parse("0042").unwrap();
        assert_eq!(p.value(), "0042");
    }

    #[test]
    fn test_parse_rejects_wrong_length_and_non_digits() {
        assert!(matches!(Passcode::parse("123"), Err(AuthError::InvalidFormat(_))));
        assert!(matches!(Passcode::parse("12345"), Err(AuthError::InvalidFormat(_))));
        assert!(matches!(Passcode::parse("12a4"), Err(AuthError::InvalidFormat(_))));
        assert!(matches!(Passcode::parse("١٢٣٤"), Err(AuthError::InvalidFormat(_))));
    }

    #[test]
    fn test_rotation_always_changes_the_value() {
        // Arrange
        let mut rng = StdRng::seed_from_u64(42);
        let mut auth = AuthState::with_passcode(Passcode::generate(&mut rng));

        for _ in 0..1_000 {
            let before = auth.passcode().value().to_string();

            // Act
            let after = auth.rotate_passcode_with(&mut rng).value().to_string();

            // Assert
            assert_ne!(before, after);
            assert_eq!(after.len(), 4);
            assert!(after.bytes().all(|b| b.is_ascii_digit()));
        }
    }

    #[test]
    fn test_scenario_rotate_then_login_right_and_wrong() {
        // Arrange: pin the passcode to the documented value
        let mut auth = AuthState::new();
        auth.set_passcode("4821").unwrap();

        // Act / Assert
        assert!(auth.login("4821").is_ok());
        assert_eq!(auth.login("0000"), Err(AuthError::WrongPasscode));
    }

    #[test]
    fn test_repeated_correct_logins_never_fail() {
        let mut auth = state_with("1234");
        let first = auth.login("1234").unwrap();
        let second = auth.login("1234").unwrap();
        assert_ne!(first.token, second.token);
        assert!(auth.is_authenticated(&first.token.to_string()));
        assert!(auth.is_authenticated(&second.token.to_string()));
    }

    #[test]
    fn test_wrong_login_does_not_mutate_state() {
        // Arrange
        let mut auth = state_with("1234");
        let existing = auth.login("1234").unwrap();
        let passcode_before = auth.passcode().clone();

        // Act
        let result = auth.login("9999");

        // Assert
        assert_eq!(result, Err(AuthError::WrongPasscode));
        assert_eq!(auth.session_count(), 1);
        assert_eq!(auth.passcode(), &passcode_before);
        assert!(auth.is_authenticated(&existing.token.to_string()));
    }

    #[test]
    fn test_is_authenticated_rejects_unknown_and_garbage_tokens() {
        let mut auth = state_with("1234");
        auth.login("1234").unwrap();
        assert!(!auth.is_authenticated(&Uuid::new_v4().to_string()));
        assert!(!auth.is_authenticated("not-a-token"));
        assert!(!auth.is_authenticated(""));
    }

    #[test]
    fn test_rotation_keeps_sessions_until_revoked() {
        let mut auth = state_with("1234");
        let session = auth.login("1234").unwrap();
        auth.rotate_passcode();
        assert!(auth.is_authenticated(&session.token.to_string()));

        auth.revoke_all_sessions();
        assert!(!auth.is_authenticated(&session.token.to_string()));
        assert_eq!(auth.session_count(), 0);
    }

    #[test]
    fn test_session_limit_evicts_oldest_login() {
        // Arrange
        let mut auth =
            AuthState::with_passcode(Passcode::parse("4821").unwrap()).with_session_limit(2);

        // Act
        let first = auth.login("4821").unwrap();
        let second = auth.login("4821").unwrap();
        let third = auth.login("4821").unwrap();

        // Assert
        assert_eq!(auth.session_count(), 2);
        assert!(!auth.is_authenticated(&first.token.to_string()));
        assert!(auth.is_authenticated(&second.token.to_string()));
        assert!(auth.is_authenticated(&third.token.to_string()));
    }

    #[test]
    fn test_default_session_limit_bounds_growth() {
        let mut auth = AuthState::with_passcode(Passcode::parse("0000").unwrap());

        for _ in 0..MAX_SESSIONS + 10 {
            auth.login("0000").unwrap();
        }

        assert_eq!(auth.session_count(), MAX_SESSIONS);
    }

    #[test]
    fn test_old_passcode_stops_working_after_rotation() {
        let mut auth = state_with("1234");
        auth.rotate_passcode();
        assert_eq!(auth.login("1234"), Err(AuthError::WrongPasscode));
        let current = auth.passcode().value().to_string();
        assert!(auth.login(&current).is_ok());
    }

    #[test]
    fn test_set_passcode_invalid_keeps_previous_value() {
        let mut auth = state_with("1234");
        assert!(auth.set_passcode("12").is_err());
        assert_eq!(auth.passcode().value(), "1234");
    }
}
