//! # 📡 THE TRANSPORT
//!
//! 🎬 COLD OPEN. INT. SERVER ROOM. 3:47 AM.
//!
//! The batch has rendered. The NDJSON is immaculate. Every line ends in `\n`, as the
//! prophecy foretold. Now somebody has to actually carry it across the network, and
//! that somebody is this module.
//!
//! ## Knowledge Graph 🧠
//! - `Transport`: the seam. One method, `perform`. Method + path + query params + body in,
//!   status + raw bytes out. The batch never sees HTTP; tests never need a network.
//! - `HttpTransport`: the real one. reqwest, auth (API key beats basic auth), optional gzip.
//!   Non-2xx answers for the request as a whole become `TransportError::Status`.
//! - `bulk_path`: `/_bulk`, `/{index}/_bulk`, `/{index}/{type}/_bulk`, segments percent-encoded.
//! - `ClientConfig`: lives here, next to the thing that uses it.
//!
//! ⚠️ This module does not retry. It does not back off. It reports, and the caller decides.
//! Retries are somebody else's 3am. 🦆

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use flate2::Compression;
use flate2::write::GzEncoder;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use reqwest::{Method, Url};
use serde::Deserialize;
use tracing::{debug, trace};

use crate::error::TransportError;

/// 🔒 Connection + auth knobs for [`HttpTransport`].
#[derive(Debug, Deserialize, Clone)]
pub struct ClientConfig {
    /// 📡 Cluster root, e.g. `http://localhost:9200`.
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// 🔒 API key. Wins over basic auth when both are configured.
    #[serde(default)]
    pub api_key: Option<String>,
    /// 🫁 gzip request bodies.
    #[serde(default)]
    pub gzip: bool,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

// 🔧 10 seconds to shake hands. If the cluster can't manage that, it's not having a good day.
fn default_connect_timeout_secs() -> u64 {
    10
}

// 🔧 30 seconds for a response. Bulk requests can be meaty. We are not monsters.
fn default_request_timeout_secs() -> u64 {
    30
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            password: None,
            api_key: None,
            gzip: false,
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// 📮 Everything the transport needs to make one request.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub method: Method,
    /// 🧭 Absolute path, already percent-encoded (see [`bulk_path`]).
    pub path: String,
    /// 🔧 Query parameters, in order. Unset parameters are simply not in here.
    pub params: Vec<(&'static str, String)>,
    pub body: String,
}

/// 📬 What came back: a status and the raw, undecoded body.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// 📡 The round trip, abstracted.
///
/// # Contract 📜
/// - `perform` returns the raw response bytes; decoding is the caller's job.
/// - Errors are returned as-is. Cancellation is dropping the future.
/// - Must be `Send + Sync` so a batch can live inside a spawned worker.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    async fn perform(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn perform(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        (**self).perform(request).await
    }
}

// 🧭 Path segments get everything a URL would misread encoded: separators, query and fragment
// markers, spaces, and the percent sign itself.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// 🧭 Build the `_bulk` path for the batch defaults.
///
/// A type without an index is dropped: `/{type}/_bulk` is not a thing.
pub fn bulk_path(index: Option<&str>, type_name: Option<&str>) -> String {
    let index = index.filter(|index| !index.is_empty());
    let type_name = type_name.filter(|type_name| !type_name.is_empty());
    match (index, type_name) {
        (Some(index), Some(type_name)) => format!(
            "/{}/{}/_bulk",
            utf8_percent_encode(index, PATH_SEGMENT),
            utf8_percent_encode(type_name, PATH_SEGMENT)
        ),
        (Some(index), None) => format!("/{}/_bulk", utf8_percent_encode(index, PATH_SEGMENT)),
        (None, _) => "/_bulk".to_string(),
    }
}

/// 📡 The real transport: reqwest under the hood, NDJSON on the wire.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HttpTransport {
    /// 🚀 Build the HTTP client with the configured timeouts. No network traffic yet.
    pub fn new(config: ClientConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("💀 The HTTP client refused to be born. Probably a TLS backend that could not initialize. Either way: tragic.")?;
        Ok(Self { client, config })
    }

    /// 📡 "Hello? Is this thing on?" A GET to the cluster root, so a bad URL or bad
    /// credentials fail loudly at startup rather than 50,000 documents later.
    pub async fn ping(&self) -> anyhow::Result<()> {
        let response = self
            .authorize(self.client.get(&self.config.url))
            .send()
            .await
            .context(format!(
                "💀 Reached out to '{}' and got ghosted. Check the URL, the network, and whether the cluster is actually running.",
                self.config.url
            ))?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!(
                "💀 The cluster at '{}' answered the ping with {}. Check your credentials. Then check them again.",
                self.config.url,
                status
            );
        }
        debug!("✅ cluster at {} is home and answering", self.config.url);
        Ok(())
    }

    // 🔒 API key is the premium tier. Basic auth is the fallback. Neither is also fine.
    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(ref api_key) = self.config.api_key {
            request.header("Authorization", format!("ApiKey {}", api_key))
        } else if let Some(ref username) = self.config.username {
            request.basic_auth(username, self.config.password.as_ref())
        } else {
            request
        }
    }

    fn gzip(body: &str) -> Result<Vec<u8>, TransportError> {
        let mut encoder = GzEncoder::new(Vec::with_capacity(body.len() / 4), Compression::default());
        encoder.write_all(body.as_bytes())?;
        Ok(encoder.finish()?)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn perform(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let base = format!("{}{}", self.config.url.trim_end_matches('/'), request.path);
        // -- 🧭 no params, no dangling `?`
        let url = if request.params.is_empty() {
            Url::parse(&base)
        } else {
            Url::parse_with_params(&base, request.params.iter().map(|(key, value)| (*key, value.as_str())))
        }
        .map_err(|err| TransportError::InvalidUrl {
            url: base.clone(),
            reason: err.to_string(),
        })?;

        debug!("📡 {} {} ({} bytes)", request.method, url, request.body.len());
        let mut builder = self
            .authorize(self.client.request(request.method, url))
            // ⚠️ x-ndjson, not json. The cluster is particular about this.
            .header("Content-Type", "application/x-ndjson");

        builder = if self.config.gzip {
            builder.header("Content-Encoding", "gzip").body(Self::gzip(&request.body)?)
        } else {
            builder.body(request.body)
        };

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.bytes().await?.to_vec();
        trace!("📬 {} answered with {} bytes", status, body.len());
        Ok(TransportResponse {
            status: status.as_u16(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use wiremock::matchers::{body_string, header, method, path, query_param};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn bulk_request(path: &str, params: Vec<(&'static str, String)>, body: &str) -> TransportRequest {
        TransportRequest {
            method: Method::POST,
            path: path.to_string(),
            params,
            body: body.to_string(),
        }
    }

    #[test]
    fn the_one_where_paths_get_built_for_every_combination() {
        assert_eq!(bulk_path(None, None), "/_bulk");
        assert_eq!(bulk_path(Some("books"), None), "/books/_bulk");
        assert_eq!(bulk_path(Some("books"), Some("_doc")), "/books/_doc/_bulk");
        assert_eq!(bulk_path(None, Some("_doc")), "/_bulk");
        assert_eq!(bulk_path(Some(""), None), "/_bulk");
    }

    #[test]
    fn the_one_where_hostile_index_names_get_encoded() {
        assert_eq!(bulk_path(Some("my index/evil?x#y"), None), "/my%20index%2Fevil%3Fx%23y/_bulk");
        assert_eq!(bulk_path(Some("100%"), None), "/100%25/_bulk");
    }

    #[tokio::test]
    async fn the_one_where_the_body_and_params_reach_the_cluster() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/books/_bulk"))
            .and(header("content-type", "application/x-ndjson"))
            .and(query_param("refresh", "wait_for"))
            .and(body_string("{\"delete\":{\"_id\":\"1\"}}\n"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"took":1,"errors":false,"items":[]}"#))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::new(ClientConfig::new(server.uri()))?;
        let response = transport
            .perform(bulk_request(
                "/books/_bulk",
                vec![("refresh", "wait_for".to_string())],
                "{\"delete\":{\"_id\":\"1\"}}\n",
            ))
            .await?;

        assert_eq!(response.status, 200);
        assert_eq!(response.body, br#"{"took":1,"errors":false,"items":[]}"#.to_vec());
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_api_key_wins_the_auth_cage_match() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/_bulk"))
            .and(header("authorization", "ApiKey sekrit"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = ClientConfig::new(server.uri());
        config.username = Some("elastic".into());
        config.password = Some("changeme".into());
        config.api_key = Some("sekrit".into());
        let transport = HttpTransport::new(config)?;
        transport.perform(bulk_request("/_bulk", vec![], "{}\n")).await?;
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_503_becomes_a_transport_error() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("cluster is napping"))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(ClientConfig::new(server.uri()))?;
        let err = transport
            .perform(bulk_request("/_bulk", vec![], "{}\n"))
            .await
            .expect_err("a 503 is not a bulk response");
        match err {
            TransportError::Status { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "cluster is napping");
            }
            other => panic!("💀 expected a status error, got {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_gzip_squishes_the_body() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("content-encoding", "gzip"))
            .respond_with(|request: &Request| {
                let mut decoded = String::new();
                let _ = GzDecoder::new(request.body.as_slice()).read_to_string(&mut decoded);
                ResponseTemplate::new(200).set_body_string(decoded)
            })
            .expect(1)
            .mount(&server)
            .await;

        let mut config = ClientConfig::new(server.uri());
        config.gzip = true;
        let transport = HttpTransport::new(config)?;
        let response = transport.perform(bulk_request("/_bulk", vec![], "{\"a\":1}\n")).await?;
        assert_eq!(String::from_utf8(response.body)?, "{\"a\":1}\n");
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_ping_finds_the_cluster_home() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"tagline":"You Know, for Search"}"#))
            .expect(1)
            .mount(&server)
            .await;

        HttpTransport::new(ClientConfig::new(server.uri()))?.ping().await
    }
}
