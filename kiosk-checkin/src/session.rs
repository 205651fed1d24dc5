//! Digit-entry sessions
//!
//! Each kiosk owns one buffer of up to [`MAX_DIGITS`] decimal digits. Kiosks
//! are told apart by the `X-Kiosk-Id` header; requests without it share the
//! `default` buffer, which is the single-kiosk deployment.
//!
//! The registry holds at most [`MAX_SESSIONS`] buffers; one left idle for
//! [`SESSION_IDLE_TIMEOUT`] is discarded.
//!
//! Within one kiosk, a lookup and a concurrent append/clear are not
//! serialized: a digit typed while a lookup is running may be cleared by it.

use crate::error::{Error, Result};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

/// Maximum identifier length (digits, without the dash)
pub const MAX_DIGITS: usize = 10;

/// Digits before the dash in the formatted identifier
const PREFIX_LEN: usize = 6;

/// Header naming the kiosk a request comes from
pub const KIOSK_ID_HEADER: &str = "x-kiosk-id";

const DEFAULT_KIOSK: &str = "default";

/// Format a digit buffer as a kennitala (`DDMMYY-NNNN`)
///
/// Buffers shorter than 6 digits are returned unchanged; from 6 digits on the
/// dash is inserted and the suffix is whatever follows, without padding.
pub fn format_identifier(raw: &str) -> String {
    if raw.chars().count() < PREFIX_LEN {
        return raw.to_string();
    }
    let prefix: String = raw.chars().take(PREFIX_LEN).collect();
    let suffix: String = raw
        .chars()
        .skip(PREFIX_LEN)
        .take(MAX_DIGITS - PREFIX_LEN)
        .collect();
    format!("{}-{}", prefix, suffix)
}

/// One kiosk's digit buffer
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionBuffer {
    digits: String,
}

impl SessionBuffer {
    /// Append a digit; no-op once the buffer is full
    pub fn push_digit(&mut self, digit: u8) -> bool {
        if digit > 9 || self.digits.len() >= MAX_DIGITS {
            return false;
        }
        self.digits.push(char::from(b'0' + digit));
        true
    }

    pub fn clear(&mut self) {
        self.digits.clear();
    }

    pub fn raw(&self) -> &str {
        &self.digits
    }

    pub fn len(&self) -> usize {
        self.digits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digits.is_empty()
    }

    /// Formatted identifier for display and lookup
    pub fn formatted(&self) -> String {
        format_identifier(&self.digits)
    }
}

/// Identifier of the kiosk a request comes from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KioskId(String);

impl KioskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for KioskId {
    fn default() -> Self {
        Self(DEFAULT_KIOSK.to_string())
    }
}

impl fmt::Display for KioskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for KioskId
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> std::result::Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(KIOSK_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        Ok(match id {
            Some(id) => KioskId::new(id),
            None => KioskId::default(),
        })
    }
}

/// Most kiosks tracked at once
pub const MAX_SESSIONS: usize = 256;

/// A buffer untouched for this long is discarded
pub const SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

#[derive(Debug)]
struct Session {
    buffer: SessionBuffer,
    touched: Instant,
}

/// All kiosk buffers, keyed by kiosk id
///
/// Bounded: idle buffers are dropped, and when the registry is full the
/// least recently used buffer makes room for a new kiosk.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<KioskId, Session>>,
    max_sessions: usize,
    idle_timeout: Duration,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::with_limits(MAX_SESSIONS, SESSION_IDLE_TIMEOUT)
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(max_sessions: usize, idle_timeout: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_sessions: max_sessions.max(1),
            idle_timeout,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<KioskId, Session>>> {
        self.sessions
            .lock()
            .map_err(|_| Error::Internal("session registry lock poisoned".to_string()))
    }

    /// Drop idle buffers, then the oldest ones until `kiosk` fits
    fn make_room(&self, sessions: &mut HashMap<KioskId, Session>, kiosk: &KioskId, now: Instant) {
        let before = sessions.len();
        sessions.retain(|_, s| now.duration_since(s.touched) < self.idle_timeout);

        if !sessions.contains_key(kiosk) {
            while sessions.len() >= self.max_sessions {
                let oldest = sessions
                    .iter()
                    .min_by_key(|(_, s)| s.touched)
                    .map(|(id, _)| id.clone());
                match oldest {
                    Some(id) => {
                        sessions.remove(&id);
                    }
                    None => break,
                }
            }
        }

        let evicted = before.saturating_sub(sessions.len());
        if evicted > 0 {
            debug!(evicted, remaining = sessions.len(), "Evicted kiosk sessions");
        }
    }

    /// Append a digit to the kiosk's buffer; returns the formatted identifier
    pub fn append_digit(&self, kiosk: &KioskId, digit: u8) -> Result<String> {
        let now = Instant::now();
        let mut sessions = self.lock()?;
        self.make_room(&mut sessions, kiosk, now);

        let session = sessions.entry(kiosk.clone()).or_insert_with(|| Session {
            buffer: SessionBuffer::default(),
            touched: now,
        });
        session.touched = now;
        session.buffer.push_digit(digit);
        Ok(session.buffer.formatted())
    }

    /// Reset the kiosk's buffer; returns the (empty) formatted identifier
    pub fn clear(&self, kiosk: &KioskId) -> Result<String> {
        let mut sessions = self.lock()?;
        sessions.remove(kiosk);
        Ok(String::new())
    }

    /// Current formatted identifier, empty when nothing was entered
    ///
    /// An idle buffer reads as empty.
    pub fn formatted(&self, kiosk: &KioskId) -> Result<String> {
        let sessions = self.lock()?;
        Ok(self
            .live(&sessions, kiosk)
            .map(SessionBuffer::formatted)
            .unwrap_or_default())
    }

    /// Number of digits currently entered on the kiosk
    pub fn digit_count(&self, kiosk: &KioskId) -> Result<usize> {
        let sessions = self.lock()?;
        Ok(self.live(&sessions, kiosk).map(SessionBuffer::len).unwrap_or(0))
    }

    /// Number of kiosks holding a buffer
    pub fn session_count(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    fn live<'a>(&self, sessions: &'a HashMap<KioskId, Session>, kiosk: &KioskId) -> Option<&'a SessionBuffer> {
        sessions
            .get(kiosk)
            .filter(|s| s.touched.elapsed() < self.idle_timeout)
            .map(|s| &s.buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_buffers_unchanged() {
        let digits = "01019";
        for len in 0..=5 {
            assert_eq!(format_identifier(&digits[..len]), &digits[..len]);
        }
    }

    #[test]
    fn test_dash_after_six_digits() {
        let digits = "0101990123";
        for len in 6..=10 {
            let formatted = format_identifier(&digits[..len]);
            assert_eq!(&formatted[..6], &digits[..6]);
            assert_eq!(&formatted[6..7], "-");
            assert_eq!(&formatted[7..], &digits[6..len]);
            assert_eq!(formatted.len(), len + 1);
        }
        assert_eq!(format_identifier("010199"), "010199-");
    }

    #[test]
    fn test_eleventh_digit_is_ignored() {
        let mut buffer = SessionBuffer::default();
        for c in "01019901234".bytes() {
            buffer.push_digit(c - b'0');
        }
        assert_eq!(buffer.raw(), "0101990123");
        assert_eq!(buffer.len(), MAX_DIGITS);
        assert_eq!(buffer.formatted(), "010199-0123");
        assert!(!buffer.push_digit(4));
    }

    #[test]
    fn test_non_digit_rejected() {
        let mut buffer = SessionBuffer::default();
        assert!(!buffer.push_digit(10));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_registry_isolates_kiosks() {
        let registry = SessionRegistry::new();
        let lobby = KioskId::new("lobby");
        let xray = KioskId::new("xray");

        registry.append_digit(&lobby, 1).unwrap();
        registry.append_digit(&lobby, 2).unwrap();
        registry.append_digit(&xray, 9).unwrap();

        assert_eq!(registry.formatted(&lobby).unwrap(), "12");
        assert_eq!(registry.formatted(&xray).unwrap(), "9");

        assert_eq!(registry.clear(&lobby).unwrap(), "");
        assert_eq!(registry.formatted(&lobby).unwrap(), "");
        assert_eq!(registry.digit_count(&xray).unwrap(), 1);
    }

    #[test]
    fn test_clear_is_repeatable() {
        let registry = SessionRegistry::new();
        let kiosk = KioskId::default();
        assert_eq!(registry.clear(&kiosk).unwrap(), "");
        assert_eq!(registry.clear(&kiosk).unwrap(), "");
        assert_eq!(registry.append_digit(&kiosk, 0).unwrap(), "0");
    }

    #[test]
    fn test_full_registry_evicts_least_recent() {
        let registry = SessionRegistry::with_limits(2, SESSION_IDLE_TIMEOUT);
        let lobby = KioskId::new("lobby");
        let xray = KioskId::new("xray");
        let lab = KioskId::new("lab");

        registry.append_digit(&lobby, 1).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        registry.append_digit(&xray, 2).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        // Touching lobby again makes xray the oldest
        registry.append_digit(&lobby, 3).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        registry.append_digit(&lab, 4).unwrap();

        assert_eq!(registry.session_count().unwrap(), 2);
        assert_eq!(registry.formatted(&lobby).unwrap(), "13");
        assert_eq!(registry.formatted(&xray).unwrap(), "");
        assert_eq!(registry.formatted(&lab).unwrap(), "4");
    }

    #[test]
    fn test_many_kiosk_ids_stay_bounded() {
        let registry = SessionRegistry::new();
        for i in 0..(MAX_SESSIONS * 4) {
            registry.append_digit(&KioskId::new(format!("kiosk-{}", i)), 1).unwrap();
        }
        assert_eq!(registry.session_count().unwrap(), MAX_SESSIONS);
    }

    #[test]
    fn test_idle_buffers_expire() {
        let registry = SessionRegistry::with_limits(MAX_SESSIONS, Duration::from_millis(20));
        let lobby = KioskId::new("lobby");
        let xray = KioskId::new("xray");

        registry.append_digit(&lobby, 5).unwrap();
        std::thread::sleep(Duration::from_millis(40));

        assert_eq!(registry.formatted(&lobby).unwrap(), "");
        assert_eq!(registry.digit_count(&lobby).unwrap(), 0);

        registry.append_digit(&xray, 7).unwrap();
        assert_eq!(registry.session_count().unwrap(), 1);

        // An expired buffer starts over rather than resuming
        assert_eq!(registry.append_digit(&lobby, 8).unwrap(), "8");
    }
}
