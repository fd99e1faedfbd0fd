//! Identifiers used across the controller
//!
//! Session and question identifiers are assigned by the server and travel as
//! JSON numbers. Option identifiers are short labels such as `"A"`. The
//! idempotency key is generated locally once per finish attempt chain.

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};
use uuid::Uuid;

/// Server-assigned identifier of one participant's attempt
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
    derive_more::FromStr,
    derive_more::From,
)]
#[serde(transparent)]
pub struct SessionId(u64);

impl SessionId {
    /// Returns the numeric value sent on the wire
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Server-assigned identifier of a question
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
    derive_more::FromStr,
    derive_more::From,
)]
#[serde(transparent)]
pub struct QuestionId(u64);

/// Identifier of an answer option within a question
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
    derive_more::From,
)]
#[serde(transparent)]
pub struct OptionId(String);

impl OptionId {
    /// Creates an option identifier from its label
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// Returns the label
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Key attached to finish requests so that retries of the same attempt
/// are recognisable by the server
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, DeserializeFromStr, SerializeDisplay,
)]
pub struct IdempotencyKey(Uuid);

impl IdempotencyKey {
    /// Creates a new random key
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for IdempotencyKey {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for IdempotencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for IdempotencyKey {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::from_str(s)?))
    }
}
