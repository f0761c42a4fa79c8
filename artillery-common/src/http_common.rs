// Copyright 2022-Present Artillery Software Inc. https://www.artillery.io/
// SPDX-License-Identifier: MPL-2.0

use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper_util::client::legacy::connect::HttpConnector;

/// Outgoing request body. Telemetry payloads are small JSON documents, so a
/// single fully-buffered frame is all we need.
pub type Body = Full<bytes::Bytes>;

pub type HttpClient = hyper_util::client::legacy::Client<HttpConnector, Body>;
pub type HttpResponse = http::Response<Incoming>;

/// Create a new default configuration hyper client.
///
/// It will keep connections open for a longer time and reuse them.
pub fn new_default_client() -> HttpClient {
    hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::default())
        .build(HttpConnector::new())
}

pub async fn collect_response_bytes(response: HttpResponse) -> anyhow::Result<bytes::Bytes> {
    Ok(response.into_body().collect().await?.to_bytes())
}
