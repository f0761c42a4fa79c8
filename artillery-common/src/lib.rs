// Copyright 2022-Present Artillery Software Inc. https://www.artillery.io/
// SPDX-License-Identifier: MPL-2.0
#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use serde::de::Error;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{borrow::Cow, ops::Deref, str::FromStr};

pub mod http_common;

pub mod header {
    #![allow(clippy::declare_interior_mutable_const)]
    use hyper::http::HeaderValue;

    pub const APPLICATION_JSON_STR: &str = "application/json";

    pub const APPLICATION_JSON: HeaderValue = HeaderValue::from_static(APPLICATION_JSON_STR);
}

pub type HttpClient = http_common::HttpClient;
pub type HttpRequestBuilder = hyper::http::request::Builder;

/// Extension trait for `Mutex` that acquires the lock, panicking if it is
/// poisoned. Avoids scattering `#[allow(clippy::unwrap_used)]` across the
/// few places holding short-lived locks.
pub trait MutexExt<T> {
    fn lock_or_panic(&self) -> std::sync::MutexGuard<'_, T>;
}

impl<T> MutexExt<T> for std::sync::Mutex<T> {
    #[inline(always)]
    #[track_caller]
    fn lock_or_panic(&self) -> std::sync::MutexGuard<'_, T> {
        #[allow(clippy::unwrap_used)]
        self.lock().unwrap()
    }
}

/// Where telemetry payloads get sent to, plus how to authenticate there.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    #[serde(serialize_with = "serialize_uri", deserialize_with = "deserialize_uri")]
    pub url: hyper::Uri,
    pub api_key: Option<Cow<'static, str>>,
    pub timeout_ms: u64,
}

impl Default for Endpoint {
    fn default() -> Self {
        Endpoint {
            url: hyper::Uri::default(),
            api_key: None,
            timeout_ms: Self::DEFAULT_TIMEOUT,
        }
    }
}

#[derive(serde::Deserialize, serde::Serialize)]
struct SerializedUri<'a> {
    scheme: Option<Cow<'a, str>>,
    authority: Option<Cow<'a, str>>,
    path_and_query: Option<Cow<'a, str>>,
}

fn serialize_uri<S>(uri: &hyper::Uri, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let parts = uri.clone().into_parts();
    let uri = SerializedUri {
        scheme: parts.scheme.as_ref().map(|s| Cow::Borrowed(s.as_str())),
        authority: parts.authority.as_ref().map(|s| Cow::Borrowed(s.as_str())),
        path_and_query: parts
            .path_and_query
            .as_ref()
            .map(|s| Cow::Borrowed(s.as_str())),
    };
    uri.serialize(serializer)
}

fn deserialize_uri<'de, D>(deserializer: D) -> Result<hyper::Uri, D::Error>
where
    D: Deserializer<'de>,
{
    let uri = SerializedUri::deserialize(deserializer)?;
    let mut builder = hyper::Uri::builder();
    if let Some(v) = uri.authority {
        builder = builder.authority(v.deref());
    }
    if let Some(v) = uri.scheme {
        builder = builder.scheme(v.deref());
    }
    if let Some(v) = uri.path_and_query {
        builder = builder.path_and_query(v.deref());
    }

    builder.build().map_err(Error::custom)
}

pub fn parse_uri(uri: &str) -> anyhow::Result<hyper::Uri> {
    Ok(hyper::Uri::from_str(uri)?)
}

impl Endpoint {
    /// Default value for the timeout field in milliseconds.
    pub const DEFAULT_TIMEOUT: u64 = 3_000;

    /// Apply standard headers (user-agent, content-type, api-key) to an
    /// [`http::request::Builder`].
    pub fn set_standard_headers(
        &self,
        mut builder: HttpRequestBuilder,
        user_agent: &str,
    ) -> HttpRequestBuilder {
        builder = builder
            .header(hyper::header::USER_AGENT, user_agent)
            .header(hyper::header::CONTENT_TYPE, header::APPLICATION_JSON);
        if let Some(api_key) = &self.api_key {
            builder = builder.header(
                hyper::header::AUTHORIZATION,
                format!("Bearer {api_key}"),
            );
        }
        builder
    }

    #[inline]
    pub fn from_url(url: hyper::Uri) -> Endpoint {
        Endpoint {
            url,
            ..Default::default()
        }
    }

    /// Set a custom timeout for this endpoint. Pass 0 to keep the default.
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = if timeout_ms == 0 {
            Self::DEFAULT_TIMEOUT
        } else {
            timeout_ms
        };
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_endpoint_has_default_timeout() {
        let e = Endpoint::default();
        assert_eq!(e.timeout_ms, Endpoint::DEFAULT_TIMEOUT);
        assert!(e.api_key.is_none());
    }

    #[test]
    fn with_timeout_zero_keeps_default() {
        let e = Endpoint::default().with_timeout(0);
        assert_eq!(e.timeout_ms, Endpoint::DEFAULT_TIMEOUT);
        let e = Endpoint::default().with_timeout(250);
        assert_eq!(e.timeout_ms, 250);
    }

    #[test]
    fn endpoint_serde_round_trip() {
        let e = Endpoint {
            url: parse_uri("https://app.posthog.com/capture/").unwrap(),
            api_key: Some("token".into()),
            timeout_ms: 1_500,
        };
        let json = serde_json::to_string(&e).unwrap();
        let back: Endpoint = serde_json::from_str(&json).unwrap();
        assert_eq!(e, back);
    }

    #[test]
    fn standard_headers_include_user_agent_and_api_key() {
        let e = Endpoint {
            url: parse_uri("http://localhost:1234/capture/").unwrap(),
            api_key: Some("secret".into()),
            timeout_ms: Endpoint::DEFAULT_TIMEOUT,
        };
        let req = e
            .set_standard_headers(hyper::Request::builder().uri(e.url.clone()), "telemetry/0.1.0")
            .body(())
            .unwrap();
        assert_eq!(req.headers()["user-agent"], "telemetry/0.1.0");
        assert_eq!(req.headers()["content-type"], "application/json");
        assert_eq!(req.headers()["authorization"], "Bearer secret");
    }
}
