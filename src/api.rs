//! Request/response contracts of the exam server
//!
//! The server answers every endpoint with a JSON object carrying a `success`
//! flag. Payload structs mirror that raw shape; `into_response` turns them
//! into typed responses, separating the normal "already finished" branch
//! from genuine rejections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use web_time::{Duration, SystemTime};

use crate::{
    ids::{IdempotencyKey, OptionId, QuestionId, SessionId},
    model::{Question, QuizResult, SessionMeta, SessionStatus},
};

/// Errors returned by exam server calls
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ApiError {
    /// The request failed in transit or the response could not be read
    #[error("network error: {message}")]
    Transport {
        /// Description of the failure
        message: String,
        /// Whether the server may have processed the request
        reached_server: bool,
    },
    /// The server answered `success: false` for a reason other than duplicate completion
    #[error("request rejected: {message}")]
    Rejected {
        /// Message from the server
        message: String,
    },
    /// The server answered `success: true` without the fields the contract requires
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ApiError {
    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Whether the server may have acted on the request before it failed
    ///
    /// A refusal means it did not; a failure before the request left the
    /// client means it could not.
    pub fn may_have_applied(&self) -> bool {
        match self {
            Self::Transport { reached_server, .. } => *reached_server,
            Self::Rejected { .. } => false,
            Self::Malformed(_) => true,
        }
    }

    /// Convenience constructor for failures before the request left the client
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            reached_server: false,
        }
    }
}

/// Whether a server message reports that the session was already finished
pub(crate) fn is_duplicate_message(message: Option<&str>) -> bool {
    message.is_some_and(|m| m.to_lowercase().contains("already"))
}

fn to_system_time(time: DateTime<Utc>) -> SystemTime {
    let millis = time.timestamp_millis();
    if millis >= 0 {
        SystemTime::UNIX_EPOCH + Duration::from_millis(millis as u64)
    } else {
        SystemTime::UNIX_EPOCH - Duration::from_millis(millis.unsigned_abs())
    }
}

/// Raw body of the start-session endpoint
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StartPayload {
    success: bool,
    message: Option<String>,
    session_id: Option<SessionId>,
    start_time: Option<DateTime<Utc>>,
    duration_minutes: Option<u32>,
    total_questions: Option<usize>,
}

/// Outcome of activating a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartResponse {
    /// A new session was activated
    Started(SessionMeta),
    /// A session already exists for this participant
    AlreadyStarted {
        /// Identifier of the existing session
        session_id: SessionId,
        /// Message from the server
        message: String,
    },
}

impl StartPayload {
    /// Interprets the raw body
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Rejected`] when the server refuses without naming
    /// an existing session, and [`ApiError::Malformed`] when a successful
    /// body lacks session metadata.
    pub fn into_response(self) -> Result<StartResponse, ApiError> {
        if !self.success {
            let message = self.message.unwrap_or_default();
            return match self.session_id {
                Some(session_id) => Ok(StartResponse::AlreadyStarted {
                    session_id,
                    message,
                }),
                None => Err(ApiError::Rejected { message }),
            };
        }

        match (self.session_id, self.start_time, self.duration_minutes) {
            (Some(id), Some(start_time), Some(duration_minutes)) => {
                Ok(StartResponse::Started(SessionMeta {
                    id,
                    start_time: to_system_time(start_time),
                    duration: Duration::from_secs(u64::from(duration_minutes) * 60),
                    total_questions: self.total_questions.unwrap_or_default(),
                    status: SessionStatus::Active,
                }))
            }
            _ => Err(ApiError::Malformed(
                "start response without session metadata".to_owned(),
            )),
        }
    }
}

/// Raw body of the fetch-questions endpoint
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SessionPayload {
    success: bool,
    message: Option<String>,
    session_id: Option<SessionId>,
    questions: Vec<Question>,
    start_time: Option<DateTime<Utc>>,
    duration_minutes: Option<u32>,
}

/// A running session together with its questions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSession {
    /// Session metadata with the authoritative start time
    pub meta: SessionMeta,
    /// Questions in the order they must be answered
    pub questions: Vec<Question>,
}

/// Outcome of fetching the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionResponse {
    /// The session is running
    Active(ActiveSession),
    /// The session was already finished
    Completed {
        /// Identifier of the finished session, when the server names it
        session_id: Option<SessionId>,
        /// Message from the server
        message: String,
    },
}

impl SessionPayload {
    /// Interprets the raw body
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Rejected`] for refusals that are not duplicate
    /// completion, and [`ApiError::Malformed`] when a successful body lacks
    /// the session id, start time or duration.
    pub fn into_response(self) -> Result<SessionResponse, ApiError> {
        if !self.success {
            return if is_duplicate_message(self.message.as_deref()) {
                Ok(SessionResponse::Completed {
                    session_id: self.session_id,
                    message: self.message.unwrap_or_default(),
                })
            } else {
                Err(ApiError::Rejected {
                    message: self.message.unwrap_or_default(),
                })
            };
        }

        match (self.session_id, self.start_time, self.duration_minutes) {
            (Some(id), Some(start_time), Some(duration_minutes)) => {
                Ok(SessionResponse::Active(ActiveSession {
                    meta: SessionMeta {
                        id,
                        start_time: to_system_time(start_time),
                        duration: Duration::from_secs(u64::from(duration_minutes) * 60),
                        total_questions: self.questions.len(),
                        status: SessionStatus::Active,
                    },
                    questions: self.questions,
                }))
            }
            _ => Err(ApiError::Malformed(
                "questions response without session metadata".to_owned(),
            )),
        }
    }
}

/// Body of the persist-answer endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersistAnswerRequest {
    /// Session the answer belongs to
    pub session_id: SessionId,
    /// Question answered
    pub question_id: QuestionId,
    /// Chosen option
    pub selected_option: OptionId,
    /// Seconds spent on the question
    pub time_spent_seconds: u64,
}

/// Raw acknowledgment of the persist-answer endpoint
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AckPayload {
    success: bool,
    message: Option<String>,
}

impl AckPayload {
    /// Interprets the raw body
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Rejected`] when the server refused the answer.
    pub fn into_response(self) -> Result<(), ApiError> {
        if self.success {
            Ok(())
        } else {
            Err(ApiError::Rejected {
                message: self.message.unwrap_or_default(),
            })
        }
    }
}

/// Body of the finish endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinishRequest {
    /// Session to finish
    pub session_id: SessionId,
    /// Visibility-loss violations observed during the attempt
    pub violation_count: u32,
    /// Sent as a header, stable across retries of one attempt
    #[serde(skip)]
    pub idempotency_key: IdempotencyKey,
}

/// Raw body of the finish endpoint
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FinishPayload {
    success: bool,
    message: Option<String>,
    #[serde(flatten)]
    result: QuizResult,
}

/// Outcome of a finish request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishResponse {
    /// This request closed the session
    Finished(QuizResult),
    /// An earlier request already closed the session
    Duplicate {
        /// Message from the server
        message: String,
    },
}

impl FinishPayload {
    /// Interprets the raw body
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Rejected`] for refusals that are not duplicate completion.
    pub fn into_response(self) -> Result<FinishResponse, ApiError> {
        if self.success {
            Ok(FinishResponse::Finished(self.result))
        } else if is_duplicate_message(self.message.as_deref()) {
            Ok(FinishResponse::Duplicate {
                message: self.message.unwrap_or_default(),
            })
        } else {
            Err(ApiError::Rejected {
                message: self.message.unwrap_or_default(),
            })
        }
    }
}

/// Raw body of the fetch-result endpoint
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ResultPayload {
    success: bool,
    message: Option<String>,
    published: bool,
    result: Option<QuizResult>,
}

/// Publication state of a finished session's result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultResponse {
    /// Whether the result has been published
    pub published: bool,
    /// The result, present once published
    pub result: Option<QuizResult>,
}

impl ResultPayload {
    /// Interprets the raw body
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Rejected`] when the server refuses the lookup.
    pub fn into_response(self) -> Result<ResultResponse, ApiError> {
        if !self.success {
            return Err(ApiError::Rejected {
                message: self.message.unwrap_or_default(),
            });
        }
        Ok(ResultResponse {
            published: self.published && self.result.is_some(),
            result: self.result,
        })
    }
}

/// The exam server as seen by the controller
///
/// The `Send` variant [`ExamApi`] is what network clients implement; the
/// single-task driver only needs [`LocalExamApi`].
#[trait_variant::make(ExamApi: Send)]
pub trait LocalExamApi {
    /// Activates a session for the authenticated participant
    async fn start_session(&self) -> Result<StartResponse, ApiError>;

    /// Fetches the question set and session metadata
    async fn fetch_session(&self) -> Result<SessionResponse, ApiError>;

    /// Persists one answer
    async fn persist_answer(&self, request: &PersistAnswerRequest) -> Result<(), ApiError>;

    /// Finishes the session
    async fn finish(&self, request: &FinishRequest) -> Result<FinishResponse, ApiError>;

    /// Fetches the result of a finished session
    async fn fetch_result(&self) -> Result<ResultResponse, ApiError>;
}
