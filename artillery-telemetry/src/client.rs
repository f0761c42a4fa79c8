// Copyright 2022-Present Artillery Software Inc. https://www.artillery.io/
// SPDX-License-Identifier: MPL-2.0

//! The dispatch sink abstraction. One variant forwards to the PostHog
//! ingestion service over HTTP, the other absorbs everything; which one a
//! process gets is decided once at startup from [`TelemetryConfig`].

use bytes::Bytes;
use serde::Serialize;
use std::{
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex},
    time::Duration,
};

use artillery_common::{http_common, Endpoint, MutexExt};
use tracing::debug;

use crate::config::TelemetryConfig;
use crate::data::{Capture, DecideRequest, DecideResponse, FeatureFlag};
use crate::error::TelemetryError;
use crate::identity;

/// Default PostHog intake host.
pub const DEFAULT_INTAKE_URL: &str = "https://app.posthog.com";

const CAPTURE_PATH: &str = "/capture/";
const DECIDE_PATH: &str = "/decide/?v=2";

pub type DispatchFuture<T> = Pin<Box<dyn Future<Output = Result<T, TelemetryError>> + Send>>;

/// Capability contract for the telemetry sink. Object-safe so the process
/// can hold either variant behind one `Box<dyn DispatchClient>` chosen at
/// startup, shared read-only afterwards.
pub trait DispatchClient: Send + Sync {
    fn enqueue(&self, capture: Capture) -> DispatchFuture<()>;
    fn close(&self) -> Result<(), TelemetryError>;
    fn is_feature_enabled(
        &self,
        key: &str,
        distinct_id: &str,
        default_value: bool,
    ) -> DispatchFuture<bool>;
    fn reload_feature_flags(&self) -> DispatchFuture<()>;
    fn get_feature_flags(&self) -> DispatchFuture<Vec<FeatureFlag>>;
}

/// Select the dispatch client variant for this process.
///
/// `disable` means a no-op sink that never touches the network. Otherwise a
/// real client is bound to the fixed ingestion token; construction failure
/// is the caller's call to treat as fatal or to continue telemetry-less.
pub fn from_config(config: &TelemetryConfig) -> Result<Box<dyn DispatchClient>, TelemetryError> {
    if config.disable {
        debug!("telemetry disabled, using no-op dispatch client");
        return Ok(Box::new(NoopClient));
    }
    debug!(intake.url = DEFAULT_INTAKE_URL, "using PostHog dispatch client");
    Ok(Box::new(PosthogClient::new(
        crate::POSTHOG_TOKEN,
        DEFAULT_INTAKE_URL,
    )?))
}

/// Absorbs every operation without observable external effect.
pub struct NoopClient;

impl DispatchClient for NoopClient {
    fn enqueue(&self, _capture: Capture) -> DispatchFuture<()> {
        Box::pin(std::future::ready(Ok(())))
    }

    fn close(&self) -> Result<(), TelemetryError> {
        Ok(())
    }

    fn is_feature_enabled(
        &self,
        _key: &str,
        _distinct_id: &str,
        _default_value: bool,
    ) -> DispatchFuture<bool> {
        Box::pin(std::future::ready(Ok(true)))
    }

    fn reload_feature_flags(&self) -> DispatchFuture<()> {
        Box::pin(std::future::ready(Ok(())))
    }

    fn get_feature_flags(&self) -> DispatchFuture<Vec<FeatureFlag>> {
        Box::pin(std::future::ready(Ok(Vec::new())))
    }
}

#[derive(Serialize)]
struct CaptureRequest<'a> {
    api_key: &'a str,
    #[serde(flatten)]
    capture: &'a Capture,
}

/// Forwards events to the PostHog ingestion service. Fire-and-forget: one
/// POST per enqueue, no retries, bounded by the endpoint timeout.
#[derive(Clone, Debug)]
pub struct PosthogClient {
    api_key: Arc<str>,
    endpoint: Endpoint,
    capture_uri: hyper::Uri,
    decide_uri: hyper::Uri,
    client: http_common::HttpClient,
    flags: Arc<Mutex<Vec<FeatureFlag>>>,
}

impl PosthogClient {
    pub fn new(api_key: &str, intake_url: &str) -> Result<Self, TelemetryError> {
        let url = artillery_common::parse_uri(intake_url)
            .map_err(|e| TelemetryError::ClientInit(e.to_string()))?;
        let capture_uri = with_path(&url, CAPTURE_PATH)?;
        let decide_uri = with_path(&url, DECIDE_PATH)?;
        Ok(PosthogClient {
            api_key: api_key.into(),
            endpoint: Endpoint::from_url(url),
            capture_uri,
            decide_uri,
            client: http_common::new_default_client(),
            flags: Arc::new(Mutex::new(Vec::new())),
        })
    }

    async fn post_json(&self, uri: hyper::Uri, body: Vec<u8>) -> Result<Bytes, TelemetryError> {
        let builder = self.endpoint.set_standard_headers(
            http::Request::builder().method(http::Method::POST).uri(uri),
            concat!("artillery-telemetry/", env!("CARGO_PKG_VERSION")),
        );
        let request = builder
            .body(http_common::Body::from(Bytes::from(body)))
            .map_err(|e| TelemetryError::Transport(e.to_string()))?;

        let timeout = Duration::from_millis(self.endpoint.timeout_ms);
        let response = tokio::time::timeout(timeout, self.client.request(request))
            .await
            .map_err(|_| TelemetryError::Transport("request timed out".to_owned()))?
            .map_err(|e| TelemetryError::Transport(e.to_string()))?;

        let status = response.status();
        let bytes = http_common::collect_response_bytes(response)
            .await
            .map_err(|e| TelemetryError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(TelemetryError::Dispatch {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        Ok(bytes)
    }

    async fn send_capture(&self, capture: Capture) -> Result<(), TelemetryError> {
        let body = serde_json::to_vec(&CaptureRequest {
            api_key: self.api_key.as_ref(),
            capture: &capture,
        })
        .map_err(|e| TelemetryError::Transport(e.to_string()))?;

        debug!(event.name = %capture.event, "dispatching telemetry event");
        self.post_json(self.capture_uri.clone(), body).await?;
        Ok(())
    }

    async fn decide(&self, distinct_id: &str) -> Result<DecideResponse, TelemetryError> {
        let body = serde_json::to_vec(&DecideRequest {
            api_key: self.api_key.as_ref(),
            distinct_id,
        })
        .map_err(|e| TelemetryError::Transport(e.to_string()))?;

        let bytes = self.post_json(self.decide_uri.clone(), body).await?;
        serde_json::from_slice(&bytes).map_err(|e| TelemetryError::Transport(e.to_string()))
    }

    async fn refresh_flags(&self) -> Result<Vec<FeatureFlag>, TelemetryError> {
        let distinct_id = identity::protected_distinct_id()?;
        let decided = self.decide(&distinct_id).await?;

        let mut flags: Vec<FeatureFlag> = decided
            .feature_flags
            .into_iter()
            .map(|(key, value)| FeatureFlag {
                key,
                enabled: flag_value_enabled(&value),
                variant: value.as_str().map(str::to_owned),
            })
            .collect();
        flags.sort_by(|a, b| a.key.cmp(&b.key));

        *self.flags.lock_or_panic() = flags.clone();
        Ok(flags)
    }
}

fn with_path(base: &hyper::Uri, path_and_query: &'static str) -> Result<hyper::Uri, TelemetryError> {
    let mut parts = base.clone().into_parts();
    parts.path_and_query = Some(http::uri::PathAndQuery::from_static(path_and_query));
    hyper::Uri::from_parts(parts).map_err(|e| TelemetryError::ClientInit(e.to_string()))
}

// Booleans are taken at face value; multivariate flags (string values)
// count as enabled.
fn flag_value_enabled(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Bool(enabled) => *enabled,
        serde_json::Value::String(_) => true,
        _ => false,
    }
}

impl DispatchClient for PosthogClient {
    fn enqueue(&self, capture: Capture) -> DispatchFuture<()> {
        let client = self.clone();
        Box::pin(async move { client.send_capture(capture).await })
    }

    fn close(&self) -> Result<(), TelemetryError> {
        // Nothing buffered; every enqueue is flushed inline.
        Ok(())
    }

    fn is_feature_enabled(
        &self,
        key: &str,
        distinct_id: &str,
        default_value: bool,
    ) -> DispatchFuture<bool> {
        let client = self.clone();
        let key = key.to_owned();
        let distinct_id = distinct_id.to_owned();
        Box::pin(async move {
            let decided = client.decide(&distinct_id).await?;
            Ok(decided
                .feature_flags
                .get(&key)
                .map(flag_value_enabled)
                .unwrap_or(default_value))
        })
    }

    fn reload_feature_flags(&self) -> DispatchFuture<()> {
        let client = self.clone();
        Box::pin(async move {
            client.refresh_flags().await?;
            Ok(())
        })
    }

    fn get_feature_flags(&self) -> DispatchFuture<Vec<FeatureFlag>> {
        let client = self.clone();
        Box::pin(async move {
            let cached = client.flags.lock_or_panic().clone();
            if !cached.is_empty() {
                return Ok(cached);
            }
            client.refresh_flags().await
        })
    }
}
