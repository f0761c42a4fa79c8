// Copyright 2022-Present Artillery Software Inc. https://www.artillery.io/
// SPDX-License-Identifier: MPL-2.0

//! Operator intent for telemetry, resolved once at process start from two
//! environment switches. Resolution never fails: absent or malformed input
//! degrades to the safe default (telemetry enabled, debug off) with a log
//! line explaining what happened.

use serde::{Deserialize, Serialize};
use std::env;
use tracing::{info, warn};

pub const ARTILLERY_DISABLE_TELEMETRY: &str = "ARTILLERY_DISABLE_TELEMETRY";
pub const ARTILLERY_TELEMETRY_DEBUG: &str = "ARTILLERY_TELEMETRY_DEBUG";

/// Process-wide telemetry switches. Built once, read-only afterwards.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// All dispatch becomes a no-op; no network calls are made.
    pub disable: bool,
    /// Events are logged locally instead of dispatched.
    pub debug: bool,
}

/// An environment variable declaration, ready for injection into a dependent
/// process or container environment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

impl TelemetryConfig {
    /// Resolve both switches from the process environment.
    pub fn from_env() -> Self {
        TelemetryConfig {
            disable: read_switch(ARTILLERY_DISABLE_TELEMETRY, "telemetry remains enabled"),
            debug: read_switch(ARTILLERY_TELEMETRY_DEBUG, "telemetry debug remains disabled"),
        }
    }

    /// Serialize the resolved switches back into the same two declarations
    /// they were parsed from, so a dependent process inherits identical
    /// behavior. Round-trips through [`TelemetryConfig::from_env`].
    pub fn to_env_vars(&self) -> Vec<EnvVar> {
        vec![
            EnvVar {
                name: ARTILLERY_DISABLE_TELEMETRY.to_owned(),
                value: self.disable.to_string(),
            },
            EnvVar {
                name: ARTILLERY_TELEMETRY_DEBUG.to_owned(),
                value: self.debug.to_string(),
            },
        ]
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

fn read_switch(name: &str, safe_state: &str) -> bool {
    let raw = match env::var(name) {
        Ok(raw) => raw,
        Err(_) => {
            info!(switch = name, "telemetry switch not set, defaulting to false");
            return false;
        }
    };

    match parse_bool(&raw) {
        Some(value) => value,
        None => {
            warn!(
                switch = name,
                value = %raw,
                "telemetry switch not set with a boolean value, {safe_state}"
            );
            false
        }
    }
}
