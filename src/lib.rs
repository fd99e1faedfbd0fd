//! # Proctor
//!
//! This library provides the session controller of a timed, proctored quiz.
//! It owns one participant's attempt from activation to termination: a
//! countdown anchored to the server's start time, focus and full-screen
//! monitoring, in-order answer persistence, and a finish request that is
//! issued at most once per session whatever triggers it.
//!
//! The core performs no I/O. Server calls leave as [`tunnel::Request`]s,
//! time-based work is scheduled as [`AlarmMessage`]s, and participant-facing
//! changes are emitted as [`UpdateMessage`]s. With the `native` feature a
//! [`driver::Driver`] runs a controller on tokio against the HTTP client.

#![cfg_attr(all(coverage_nightly, test), feature(coverage_attribute))]
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::struct_field_names)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::module_name_repetitions)]
use serde::{Deserialize, Serialize};

pub mod api;
pub mod bootstrap;
#[cfg(feature = "native")]
pub mod client;
pub mod config;
pub mod constants;
pub mod controller;
#[cfg(feature = "native")]
pub mod driver;
pub mod finish;
pub mod ids;
pub mod integrity;
pub mod model;
pub mod platform;
pub mod recorder;
pub mod result;
pub mod retry;
#[cfg(test)]
mod testing;
pub mod timer;
pub mod tunnel;

/// Messages sent to update the participant's view
///
/// Each component contributes its own variants; the host renders them or
/// forwards them as JSON with [`UpdateMessage::to_message`].
#[derive(Debug, Serialize, Clone, PartialEq, Eq, derive_more::From)]
pub enum UpdateMessage {
    /// State changes, errors and the final outcome
    Controller(controller::UpdateMessage),
    /// Remaining time
    Countdown(timer::UpdateMessage),
    /// Integrity warnings
    Integrity(integrity::UpdateMessage),
    /// Question display and answer saving
    Recorder(recorder::UpdateMessage),
    /// Result publication
    Result(result::UpdateMessage),
}

/// Alarm messages for timed events of the different components
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::From, Serialize, Deserialize)]
pub enum AlarmMessage {
    /// Countdown ticks
    Countdown(timer::AlarmMessage),
    /// Grace period end and full-screen re-entry
    Integrity(integrity::AlarmMessage),
    /// Result publication polls
    Result(result::AlarmMessage),
}

impl UpdateMessage {
    /// Converts the update message to a JSON string for transmission
    ///
    /// # Panics
    ///
    /// This method panics if serialization fails, which should never happen
    /// with the default JSON serializer for well-formed data.
    pub fn to_message(&self) -> String {
        serde_json::to_string(self).expect("default serializer cannot fail")
    }
}
