//! Session bootstrap
//!
//! Turns the fetch-session reply into the controller's initial branch. The
//! remaining time is always recomputed from the server's start time; the
//! local cache is only refreshed, never read for timing.

use web_time::SystemTime;

use crate::{
    api::{ActiveSession, ApiError, LocalExamApi, SessionResponse, StartResponse},
    ids::SessionId,
    model::{Question, SessionMeta},
    platform::{LocalCache, SessionCache},
    timer,
};

/// An attempt ready to enter the active state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveAttempt {
    /// Authoritative session metadata
    pub meta: SessionMeta,
    /// Questions in answer order
    pub questions: Vec<Question>,
    /// Remaining whole seconds at bootstrap time
    pub remaining_seconds: u64,
}

/// Initial branch chosen from the fetch-session reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bootstrap {
    /// The session is running
    Active(ActiveAttempt),
    /// The session was finished before this controller started
    AlreadySubmitted {
        /// Identifier of the finished session, when known
        session_id: Option<SessionId>,
        /// Message from the server
        message: String,
    },
}

/// Interprets a successful fetch-session reply
///
/// An active session refreshes the cache with the server's values; a
/// completed one clears it.
///
/// # Arguments
///
/// * `response` - The typed reply of the fetch-session call
/// * `cache` - Session cache to refresh
/// * `now` - Current time, for the remaining-time computation
pub fn interpret<K: LocalCache>(
    response: SessionResponse,
    cache: &SessionCache<K>,
    now: SystemTime,
) -> Bootstrap {
    match response {
        SessionResponse::Active(ActiveSession { meta, questions }) => {
            if let Some(cached) = cache.session_id().filter(|cached| *cached != meta.id) {
                tracing::debug!(%cached, session_id = %meta.id, "replacing stale cached session");
            }
            cache.store(&meta);
            let remaining_seconds = timer::remaining_seconds(meta.start_time, meta.duration, now);
            tracing::debug!(session_id = %meta.id, remaining_seconds, "session bootstrapped");
            Bootstrap::Active(ActiveAttempt {
                meta,
                questions,
                remaining_seconds,
            })
        }
        SessionResponse::Completed {
            session_id,
            message,
        } => {
            let session_id = session_id.or_else(|| cache.session_id());
            tracing::info!(?session_id, "session already submitted");
            cache.clear();
            Bootstrap::AlreadySubmitted {
                session_id,
                message,
            }
        }
    }
}

/// Activates a session for the participant before the first bootstrap
///
/// A fresh activation caches the returned metadata. When the server reports
/// an existing session, only its id is cached and the caller proceeds to
/// bootstrap it.
///
/// # Errors
///
/// Returns the [`ApiError`] of the start-session call.
pub async fn activate<A: LocalExamApi, K: LocalCache>(
    api: &A,
    cache: &SessionCache<K>,
) -> Result<SessionId, ApiError> {
    match api.start_session().await? {
        StartResponse::Started(meta) => {
            cache.store(&meta);
            tracing::debug!(session_id = %meta.id, "session activated");
            Ok(meta.id)
        }
        StartResponse::AlreadyStarted {
            session_id,
            message,
        } => {
            tracing::info!(%session_id, %message, "resuming existing session");
            cache.store_session_id(session_id);
            Ok(session_id)
        }
    }
}
