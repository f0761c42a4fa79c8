// Copyright 2022-Present Artillery Software Inc. https://www.artillery.io/
// SPDX-License-Identifier: MPL-2.0

//! Error types for `artillery-telemetry`.

use thiserror::Error;

/// Errors that can escape the telemetry core.
///
/// Soft failures (missing env switches, unreachable network probes) never
/// show up here; they degrade to safe defaults with a log line. Only genuine
/// failures to identify the machine or hand an event to the ingestion
/// service are surfaced.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The per-installation machine identity could not be derived, e.g. in a
    /// sandboxed environment without a machine id. The affected event is
    /// dropped; later enqueue attempts are unaffected.
    #[error("machine identity unavailable: {0}")]
    IdentityUnavailable(String),

    /// The dispatch client could not be constructed at startup.
    #[error("dispatch client init failed: {0}")]
    ClientInit(String),

    /// The ingestion service rejected the event.
    #[error("dispatch failed with status {status}: {body}")]
    Dispatch {
        /// The HTTP status code (e.g. 401, 503).
        status: u16,
        /// The response body, lossy-decoded as UTF-8.
        body: String,
    },

    /// The event never reached the ingestion service (connect failure,
    /// timeout, malformed response).
    #[error("dispatch transport error: {0}")]
    Transport(String),
}
