// Copyright 2022-Present Artillery Software Inc. https://www.artillery.io/
// SPDX-License-Identifier: MPL-2.0

//! Anonymous, privacy-preserving usage telemetry for the Artillery
//! operator. Events are enriched with a hashed environment fingerprint and
//! forwarded fire-and-forget to the ingestion service, logged locally, or
//! dropped, depending on two environment switches resolved at startup.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use tracing::info;

pub mod client;
pub mod config;
pub mod data;
pub mod error;
pub mod identity;
pub mod info;

pub use client::{from_config, DispatchClient, NoopClient, PosthogClient};
pub use config::{EnvVar, TelemetryConfig};
pub use data::{Capture, FeatureFlag, Properties, TelemetryEvent};
pub use error::TelemetryError;

/// Application name; also the namespace for the machine identity.
pub const APP_NAME: &str = "artillery-operator";

/// Build version reported with every event.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The worker image the operator launches load tests with.
pub const WORKER_IMAGE: &str = "artilleryio/artillery:latest";

/// Write-only project token for the ingestion service. Not a secret.
pub const POSTHOG_TOKEN: &str = "phc_VBGEGLCLMTuZ0BtsiCjymGNHTgTYSR7IdpTpppJbu23";

/// Marker attached to every locally logged property in debug mode.
pub const DEBUG_MARKER: &str = "ARTILLERY_TELEMETRY_DEBUG=true";

/// Assemble the property set attached to a dispatched event: static
/// environment facts, hashed network identifiers, and the caller's
/// event-specific entries merged last (caller keys win).
///
/// Never fails. The IP and hostname lookups are best-effort; when one is
/// unavailable its hash degrades to the digest of the empty string. `$ip`
/// is explicitly null so the ingestion service performs no server-side
/// geolocation.
pub fn build_properties(extra: &Properties) -> Properties {
    let hostname = info::os::real_hostname().unwrap_or_default();
    let ip = info::net::preferred_outbound_ip()
        .map(|ip| ip.to_string())
        .unwrap_or_default();

    let mut properties = Properties::new();
    properties.insert("source".to_owned(), APP_NAME.into());
    properties.insert("version".to_owned(), VERSION.into());
    properties.insert(
        "containerOS".to_owned(),
        info::os::os_name().to_lowercase().into(),
    );
    properties.insert("workerImage".to_owned(), WORKER_IMAGE.into());
    properties.insert("ipHash".to_owned(), identity::hash_encode(&ip).into());
    properties.insert(
        "hostnameHash".to_owned(),
        identity::hash_encode(&hostname).into(),
    );
    properties.insert("$ip".to_owned(), serde_json::Value::Null);

    for (key, value) in extra {
        properties.insert(key.clone(), value.clone());
    }

    properties
}

fn debug_properties(properties: &Properties) {
    for (key, value) in properties {
        info!(marker = DEBUG_MARKER, property = %key, value = %value, "telemetry event property");
    }
}

/// Enrich one event and hand it to the dispatch client, or log it locally.
///
/// Debug wins over disable: with `config.debug` set, nothing ever reaches
/// the dispatch client, whichever variant was constructed. Otherwise the
/// event is tagged with the machine identity and forwarded once, with any
/// client error propagated verbatim. No retries at this layer.
pub async fn enqueue(
    client: &dyn DispatchClient,
    config: &TelemetryConfig,
    event: TelemetryEvent,
) -> Result<(), TelemetryError> {
    enqueue_with_identity(client, config, event, identity::protected_distinct_id).await
}

async fn enqueue_with_identity(
    client: &dyn DispatchClient,
    config: &TelemetryConfig,
    event: TelemetryEvent,
    distinct_id: impl FnOnce() -> Result<String, TelemetryError>,
) -> Result<(), TelemetryError> {
    let properties = build_properties(&event.properties);

    if config.debug {
        debug_properties(&properties);
        return Ok(());
    }

    let distinct_id = distinct_id()?;

    client
        .enqueue(Capture {
            distinct_id,
            event: event.name,
            properties,
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use client::DispatchFuture;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const FIXED_KEYS: &[&str] = &[
        "source",
        "version",
        "containerOS",
        "workerImage",
        "ipHash",
        "hostnameHash",
        "$ip",
    ];

    /// Records enqueued captures, optionally failing every call.
    #[derive(Default)]
    struct RecordingClient {
        enqueued: Mutex<Vec<Capture>>,
        calls: AtomicUsize,
        fail_with: Option<fn() -> TelemetryError>,
    }

    impl DispatchClient for RecordingClient {
        fn enqueue(&self, capture: Capture) -> DispatchFuture<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.enqueued.lock().unwrap().push(capture);
            match self.fail_with {
                Some(make_err) => Box::pin(std::future::ready(Err(make_err()))),
                None => Box::pin(std::future::ready(Ok(()))),
            }
        }

        fn close(&self) -> Result<(), TelemetryError> {
            Ok(())
        }

        fn is_feature_enabled(&self, _: &str, _: &str, default: bool) -> DispatchFuture<bool> {
            Box::pin(std::future::ready(Ok(default)))
        }

        fn reload_feature_flags(&self) -> DispatchFuture<()> {
            Box::pin(std::future::ready(Ok(())))
        }

        fn get_feature_flags(&self) -> DispatchFuture<Vec<FeatureFlag>> {
            Box::pin(std::future::ready(Ok(Vec::new())))
        }
    }

    #[test]
    fn build_properties_contains_every_fixed_key() {
        let properties = build_properties(&Properties::new());
        for key in FIXED_KEYS {
            assert!(properties.contains_key(*key), "missing {key}");
        }
        assert_eq!(properties.len(), FIXED_KEYS.len());
    }

    #[test]
    fn build_properties_sets_ip_to_null() {
        let properties = build_properties(&Properties::new());
        assert!(properties["$ip"].is_null());
    }

    #[test]
    fn build_properties_hashes_are_log_safe() {
        let properties = build_properties(&Properties::new());
        // Hashes are present even when the underlying lookups failed.
        assert_eq!(properties["ipHash"].as_str().unwrap().len(), 44);
        assert_eq!(properties["hostnameHash"].as_str().unwrap().len(), 44);
        assert_eq!(properties["source"], json!(APP_NAME));
        assert_eq!(properties["version"], json!(VERSION));
    }

    #[test]
    fn build_properties_merges_extra_last() {
        let mut extra = Properties::new();
        extra.insert("count".to_owned(), json!(7));
        extra.insert("source".to_owned(), json!("overridden"));

        let properties = build_properties(&extra);
        assert_eq!(properties["count"], json!(7));
        assert_eq!(properties["source"], json!("overridden"));
        assert_eq!(properties.len(), FIXED_KEYS.len() + 1);
    }

    #[tokio::test]
    async fn debug_mode_never_invokes_the_client() {
        let client = RecordingClient::default();
        let config = TelemetryConfig {
            disable: false,
            debug: true,
        };

        enqueue(&client, &config, TelemetryEvent::new("operator started"))
            .await
            .unwrap();
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn debug_wins_over_disable() {
        let client = RecordingClient::default();
        let config = TelemetryConfig {
            disable: true,
            debug: true,
        };

        enqueue(&client, &config, TelemetryEvent::new("operator started"))
            .await
            .unwrap();
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn enqueue_tags_events_with_the_machine_identity() {
        let client = RecordingClient::default();
        let config = TelemetryConfig::default();

        enqueue_with_identity(
            &client,
            &config,
            TelemetryEvent::new("load test created").with_property("count", 2),
            || Ok("machine-a1b2".to_owned()),
        )
        .await
        .unwrap();

        let enqueued = client.enqueued.lock().unwrap();
        assert_eq!(enqueued.len(), 1);
        assert_eq!(enqueued[0].event, "load test created");
        assert_eq!(enqueued[0].distinct_id, "machine-a1b2");
        assert_eq!(enqueued[0].properties["count"], json!(2));
        assert_eq!(enqueued[0].properties["source"], json!(APP_NAME));
    }

    #[tokio::test]
    async fn identity_failure_aborts_enqueue_without_dispatch() {
        let client = RecordingClient::default();
        let config = TelemetryConfig::default();

        let err = enqueue_with_identity(
            &client,
            &config,
            TelemetryEvent::new("load test created"),
            || Err(TelemetryError::IdentityUnavailable("no readable machine id source".to_owned())),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, TelemetryError::IdentityUnavailable(_)));
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn enqueue_propagates_client_errors_verbatim() {
        let client = RecordingClient {
            fail_with: Some(|| TelemetryError::Dispatch {
                status: 503,
                body: "backend down".to_owned(),
            }),
            ..Default::default()
        };
        let config = TelemetryConfig::default();

        let err = enqueue_with_identity(&client, &config, TelemetryEvent::new("x"), || {
            Ok("machine-a1b2".to_owned())
        })
        .await
        .unwrap_err();
        match err {
            TelemetryError::Dispatch { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "backend down");
            }
            other => panic!("expected dispatch error, got {other}"),
        }
    }
}
