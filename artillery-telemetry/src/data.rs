// Copyright 2022-Present Artillery Software Inc. https://www.artillery.io/
// SPDX-License-Identifier: MPL-2.0

//! Event and wire types exchanged with the ingestion service.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The merged mapping of environment facts and event-specific data attached
/// to every dispatched event. Keys are unique; values are arbitrary JSON.
pub type Properties = serde_json::Map<String, serde_json::Value>;

/// One telemetry-worthy occurrence, built ad hoc at the call site and
/// consumed once by the enqueuer.
#[derive(Clone, Debug, Default)]
pub struct TelemetryEvent {
    pub name: String,
    pub properties: Properties,
}

impl TelemetryEvent {
    pub fn new(name: impl Into<String>) -> Self {
        TelemetryEvent {
            name: name.into(),
            properties: Properties::new(),
        }
    }

    pub fn with_property(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// A fully enriched event, tagged with the machine identity, as handed to
/// the dispatch client.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Capture {
    pub distinct_id: String,
    pub event: String,
    pub properties: Properties,
}

/// One feature flag as reported by the ingestion service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureFlag {
    pub key: String,
    pub enabled: bool,
    /// Variant name for multivariate flags, absent for plain booleans.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

/// Body of a flag-evaluation request against the `/decide/` endpoint.
#[derive(Debug, Serialize)]
pub struct DecideRequest<'a> {
    pub api_key: &'a str,
    pub distinct_id: &'a str,
}

/// The subset of the `/decide/` response this crate consumes.
#[derive(Debug, Default, Deserialize)]
pub struct DecideResponse {
    #[serde(default, rename = "featureFlags")]
    pub feature_flags: HashMap<String, serde_json::Value>,
}
