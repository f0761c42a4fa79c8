// Copyright 2022-Present Artillery Software Inc. https://www.artillery.io/
// SPDX-License-Identifier: MPL-2.0

//! One-way hashing of identifying strings, plus the stable per-installation
//! identity sent to the ingestion service as the distinct id.

use base64::Engine;
use sha2::{Digest, Sha256};

use crate::error::TelemetryError;

/// Irreversibly encode an identifying string (IP address, hostname).
///
/// SHA-256 then standard base64, so the output is printable and log-safe.
/// Defined for the empty string as well, which is what callers feed in when
/// the underlying lookup failed.
pub fn hash_encode(raw: &str) -> String {
    let hashed = Sha256::digest(raw.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(hashed)
}

// Machine id sources in preference order. systemd first, older dbus location
// second, BSD-style hostid as a last resort.
#[cfg(unix)]
const MACHINE_ID_PATHS: &[&str] = &[
    "/etc/machine-id",
    "/var/lib/dbus/machine-id",
    "/etc/hostid",
];

#[cfg(unix)]
fn machine_id() -> Option<String> {
    machine_id_from_paths(MACHINE_ID_PATHS)
}

#[cfg(unix)]
fn machine_id_from_paths(paths: &[&str]) -> Option<String> {
    for path in paths {
        if let Ok(raw) = std::fs::read_to_string(path) {
            let id = raw.trim();
            if !id.is_empty() {
                return Some(id.to_owned());
            }
        }
    }
    None
}

/// Only unix machine-id sources are wired up; the operator ships as a Linux
/// container image. Other platforms report the identity as unavailable.
#[cfg(not(unix))]
fn machine_id() -> Option<String> {
    None
}

/// The distinct id grouping this installation's events.
///
/// Stable across restarts on the same machine, scoped by the application
/// name so the value is not trivially linkable across applications, and
/// never reveals the raw machine id.
pub fn protected_distinct_id() -> Result<String, TelemetryError> {
    let id = machine_id().ok_or_else(|| {
        TelemetryError::IdentityUnavailable("no readable machine id source".to_owned())
    })?;

    let mut hasher = Sha256::new();
    hasher.update(crate::APP_NAME.as_bytes());
    hasher.update(b"|");
    hasher.update(id.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}
