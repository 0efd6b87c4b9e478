// HTTP and stub transports
//
// `HttpTransport` wraps `reqwest::Client` with base-address joining,
// JSON:API headers and credential injection. `StubTransport` answers
// every request from canned bodies without touching the network.

use bytes::Bytes;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::request::{ApiRequest, HttpMethod, JSON_API_MEDIA_TYPE, OperationKind, RawResponse};
use crate::transport::TransportConfig;

/// Join a base address and an operation path into a full URL.
///
/// The base may carry a path prefix (`https://host/api/v1`); the operation
/// path is appended to it rather than replacing it.
pub fn join_url(base: &Url, path: &str) -> Result<Url, Error> {
    let full = format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    Ok(Url::parse(&full)?)
}

/// Real HTTP transport backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport from a `TransportConfig`.
    pub fn new(config: &TransportConfig) -> Result<Self, Error> {
        Ok(Self {
            http: config.build_client()?,
        })
    }

    /// Create a transport with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// The underlying HTTP client.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Execute a described operation against `base`.
    ///
    /// Any status is returned as a `RawResponse`; only transport-level
    /// failures become errors here.
    pub async fn execute(&self, base: &Url, request: &ApiRequest) -> Result<RawResponse, Error> {
        let url = join_url(base, &request.path)?;
        debug!(method = %request.method, %url, kind = %request.kind, "sending request");

        let mut builder = match request.method {
            HttpMethod::Get => self.http.get(url),
            HttpMethod::Post => self.http.post(url),
            HttpMethod::Patch => self.http.patch(url),
            HttpMethod::Delete => self.http.delete(url),
        }
        .header(ACCEPT, JSON_API_MEDIA_TYPE);

        if let Some(ref credential) = request.credential {
            builder = builder.header(AUTHORIZATION, credential.header_value());
        }
        if let Some(ref body) = request.body {
            builder = builder
                .header(CONTENT_TYPE, JSON_API_MEDIA_TYPE)
                .body(body.clone());
        }

        let resp = builder.send().await?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await?;
        debug!(status, bytes = body.len(), "response received");

        Ok(RawResponse { status, body })
    }
}

/// Canned bodies returned in testing mode, one per operation kind.
///
/// Updates reuse the create body, mirroring how a backend echoes the
/// written resource for both.
#[derive(Debug, Clone, Default)]
pub struct StubResponses {
    pub list: Bytes,
    pub create: Bytes,
    pub delete: Bytes,
}

impl StubResponses {
    pub fn with_list(mut self, body: impl Into<Bytes>) -> Self {
        self.list = body.into();
        self
    }

    pub fn with_create(mut self, body: impl Into<Bytes>) -> Self {
        self.create = body.into();
        self
    }

    pub fn with_delete(mut self, body: impl Into<Bytes>) -> Self {
        self.delete = body.into();
        self
    }

    fn body_for(&self, kind: OperationKind) -> Bytes {
        match kind {
            OperationKind::List => self.list.clone(),
            OperationKind::Create | OperationKind::Update => self.create.clone(),
            OperationKind::Delete => self.delete.clone(),
        }
    }
}

/// Transport that never performs I/O.
#[derive(Debug, Clone, Default)]
pub struct StubTransport {
    responses: StubResponses,
}

impl StubTransport {
    pub fn new(responses: StubResponses) -> Self {
        Self { responses }
    }

    /// Answer `request` with the canned body for its kind and status 200.
    pub fn execute(&self, request: &ApiRequest) -> RawResponse {
        debug!(method = %request.method, path = %request.path, "stubbed request");
        RawResponse::new(200, self.responses.body_for(request.kind))
    }
}
