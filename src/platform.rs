//! Capability interfaces over the hosting platform
//!
//! The controller needs three things from its environment: control over the
//! full-screen presentation mode, a client-local key-value cache that
//! survives a reload, and the current time. Visibility and full-screen
//! notifications flow the other way and arrive as method calls on the
//! controller.

use std::{cell::RefCell, collections::HashMap, rc::Rc};

use chrono::{DateTime, Utc};
use thiserror::Error;
use web_time::{Duration, SystemTime};

use crate::{constants::cache, ids::SessionId, model::SessionMeta};

/// Errors reported by the presentation capability
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PresentationError {
    /// The platform refused to enter full-screen, e.g. without a user gesture
    #[error("full-screen request refused: {0}")]
    Refused(String),
    /// The platform has no full-screen support
    #[error("full-screen is not supported")]
    Unsupported,
}

/// Full-screen presentation control
pub trait Presentation {
    /// Asks the platform to enter full-screen presentation mode
    ///
    /// # Errors
    ///
    /// Returns an error if the platform refuses or lacks support.
    fn request_fullscreen(&self) -> Result<(), PresentationError>;

    /// Leaves full-screen presentation mode if it is active
    fn exit_fullscreen(&self);

    /// Whether full-screen presentation mode is currently active
    fn is_fullscreen(&self) -> bool;
}

/// Durable client-local key-value cache scoped to one browser tab session
pub trait LocalCache {
    /// Reads a value
    fn get(&self, key: &str) -> Option<String>;

    /// Writes a value
    fn set(&self, key: &str, value: String);

    /// Deletes a value
    fn remove(&self, key: &str);
}

/// Source of the current wall-clock time
pub trait Clock {
    /// The current time
    fn now(&self) -> SystemTime;
}

impl<T: Presentation + ?Sized> Presentation for Rc<T> {
    fn request_fullscreen(&self) -> Result<(), PresentationError> {
        (**self).request_fullscreen()
    }

    fn exit_fullscreen(&self) {
        (**self).exit_fullscreen();
    }

    fn is_fullscreen(&self) -> bool {
        (**self).is_fullscreen()
    }
}

impl<T: LocalCache + ?Sized> LocalCache for Rc<T> {
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: String) {
        (**self).set(key, value);
    }

    fn remove(&self, key: &str) {
        (**self).remove(key);
    }
}

impl<T: Clock + ?Sized> Clock for Rc<T> {
    fn now(&self) -> SystemTime {
        (**self).now()
    }
}

/// The platform's real clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// In-memory [`LocalCache`] for native hosts and tests
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RefCell<HashMap<String, String>>,
}

impl LocalCache for MemoryCache {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }

    fn set(&self, key: &str, value: String) {
        self.entries.borrow_mut().insert(key.to_owned(), value);
    }

    fn remove(&self, key: &str) {
        self.entries.borrow_mut().remove(key);
    }
}

/// Presentation for hosts without a full-screen mode, e.g. a terminal
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPresentation;

impl Presentation for NoPresentation {
    fn request_fullscreen(&self) -> Result<(), PresentationError> {
        Err(PresentationError::Unsupported)
    }

    fn exit_fullscreen(&self) {}

    fn is_fullscreen(&self) -> bool {
        false
    }
}

/// Session values recovered from the local cache after a reload
///
/// Only the session id is ever trusted on its own; the start time and
/// duration are replaced by the server's values on every bootstrap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedSession {
    /// Session identifier
    pub session_id: SessionId,
    /// Start time as last received from the server
    pub start_time: Option<SystemTime>,
    /// Duration in minutes
    pub duration_minutes: Option<u64>,
    /// Question count
    pub total_questions: Option<usize>,
}

/// Typed view over the session keys of a [`LocalCache`]
#[derive(Debug)]
pub struct SessionCache<K> {
    inner: K,
}

impl<K: LocalCache> SessionCache<K> {
    /// Wraps a raw cache
    pub fn new(inner: K) -> Self {
        Self { inner }
    }

    /// Stores the authoritative session values
    pub fn store(&self, meta: &SessionMeta) {
        self.inner.set(cache::SESSION_ID, meta.id.to_string());
        self.inner.set(
            cache::START_TIME,
            DateTime::<Utc>::from(to_std(meta.start_time)).to_rfc3339(),
        );
        self.inner
            .set(cache::DURATION_MINUTES, meta.duration_minutes().to_string());
        self.inner
            .set(cache::TOTAL_QUESTIONS, meta.total_questions.to_string());
    }

    /// Stores only a session id, as learned from an "already started" reply
    pub fn store_session_id(&self, session_id: SessionId) {
        self.inner.set(cache::SESSION_ID, session_id.to_string());
    }

    /// The cached session id, if any parses
    pub fn session_id(&self) -> Option<SessionId> {
        self.inner.get(cache::SESSION_ID)?.parse().ok()
    }

    /// Everything cached about the in-progress attempt
    pub fn load(&self) -> Option<CachedSession> {
        Some(CachedSession {
            session_id: self.session_id()?,
            start_time: self
                .inner
                .get(cache::START_TIME)
                .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
                .map(|time| from_std(std::time::SystemTime::from(time.with_timezone(&Utc)))),
            duration_minutes: self
                .inner
                .get(cache::DURATION_MINUTES)
                .and_then(|raw| raw.parse().ok()),
            total_questions: self
                .inner
                .get(cache::TOTAL_QUESTIONS)
                .and_then(|raw| raw.parse().ok()),
        })
    }

    /// Removes every session artifact
    pub fn clear(&self) {
        for key in [
            cache::SESSION_ID,
            cache::START_TIME,
            cache::DURATION_MINUTES,
            cache::TOTAL_QUESTIONS,
        ] {
            self.inner.remove(key);
        }
    }
}

fn since_epoch(time: SystemTime) -> Duration {
    time.duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
}

fn to_std(time: SystemTime) -> std::time::SystemTime {
    std::time::SystemTime::UNIX_EPOCH + since_epoch(time)
}

fn from_std(time: std::time::SystemTime) -> SystemTime {
    SystemTime::UNIX_EPOCH
        + time
            .duration_since(std::time::SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::model::SessionStatus;

    fn meta() -> SessionMeta {
        SessionMeta {
            id: SessionId::from(77),
            start_time: SystemTime::UNIX_EPOCH + Duration::from_secs(1_767_261_600),
            duration: Duration::from_secs(15 * 60),
            total_questions: 10,
            status: SessionStatus::Active,
        }
    }

    #[test]
    fn test_store_and_load() {
        let cache = SessionCache::new(MemoryCache::default());
        cache.store(&meta());

        let loaded = cache.load().unwrap();
        assert_eq!(loaded.session_id, SessionId::from(77));
        assert_eq!(loaded.start_time, Some(meta().start_time));
        assert_eq!(loaded.duration_minutes, Some(15));
        assert_eq!(loaded.total_questions, Some(10));
    }

    #[test]
    fn test_clear_removes_every_key() {
        let raw = Rc::new(MemoryCache::default());
        let cache = SessionCache::new(Rc::clone(&raw));
        cache.store(&meta());
        raw.set("student_token", "keep-me".to_owned());

        cache.clear();

        assert!(cache.load().is_none());
        assert!(raw.get(crate::constants::cache::START_TIME).is_none());
        assert_eq!(raw.get("student_token").as_deref(), Some("keep-me"));
    }

    #[test]
    fn test_session_id_only() {
        let cache = SessionCache::new(MemoryCache::default());
        cache.store_session_id(SessionId::from(5));

        let loaded = cache.load().unwrap();
        assert_eq!(loaded.session_id, SessionId::from(5));
        assert_eq!(loaded.start_time, None);
    }

    #[test]
    fn test_corrupt_session_id_is_ignored() {
        let raw = MemoryCache::default();
        raw.set(crate::constants::cache::SESSION_ID, "abc".to_owned());
        let cache = SessionCache::new(raw);

        assert_eq!(cache.session_id(), None);
        assert!(cache.load().is_none());
    }

    #[test]
    fn test_no_presentation_refuses() {
        assert_eq!(
            NoPresentation.request_fullscreen(),
            Err(PresentationError::Unsupported)
        );
        assert!(!NoPresentation.is_fullscreen());
    }
}
