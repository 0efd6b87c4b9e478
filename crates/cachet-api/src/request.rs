// ── Described network operations ──
//
// An `ApiRequest` is a transport-neutral description of one call: what
// kind of operation it is, the HTTP method, the path relative to the
// configured base address, an already-encoded body and the credential to
// present. Both the HTTP and the stub transport consume it.

use std::fmt;

use bytes::Bytes;
use secrecy::{ExposeSecret, SecretString};

use crate::error::Error;

/// Media type used for JSON:API request and response bodies.
pub const JSON_API_MEDIA_TYPE: &str = "application/vnd.api+json";

/// HTTP method of a described operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Patch,
    Delete,
}

/// The four operations every entity type exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum OperationKind {
    List,
    Create,
    Update,
    Delete,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        self.into()
    }

    /// The HTTP method this operation maps to.
    pub fn method(self) -> HttpMethod {
        match self {
            Self::List => HttpMethod::Get,
            Self::Create => HttpMethod::Post,
            Self::Update => HttpMethod::Patch,
            Self::Delete => HttpMethod::Delete,
        }
    }
}

/// Credential presented in the `Authorization` header.
#[derive(Clone)]
pub struct Credential {
    scheme: String,
    token: SecretString,
}

impl Credential {
    /// A bearer credential (`Authorization: Bearer <token>`).
    pub fn bearer(token: SecretString) -> Self {
        Self::with_scheme("Bearer", token)
    }

    /// A credential with a custom scheme, e.g. `Token`.
    pub fn with_scheme(scheme: impl Into<String>, token: SecretString) -> Self {
        Self {
            scheme: scheme.into(),
            token,
        }
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Render the header value. Only the transport should call this.
    pub(crate) fn header_value(&self) -> String {
        format!("{} {}", self.scheme, self.token.expose_secret())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("scheme", &self.scheme)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// A fully described operation, ready to hand to a transport.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub kind: OperationKind,
    pub method: HttpMethod,
    /// Path relative to the base address, always starting with `/`.
    pub path: String,
    /// Encoded JSON:API body (create/update only).
    pub body: Option<Bytes>,
    pub credential: Option<Credential>,
}

impl ApiRequest {
    /// Describe an operation of `kind` against `path` with no body.
    pub fn new(kind: OperationKind, path: impl Into<String>) -> Self {
        Self {
            kind,
            method: kind.method(),
            path: path.into(),
            body: None,
            credential: None,
        }
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_credential(mut self, credential: Option<Credential>) -> Self {
        self.credential = credential;
        self
    }
}

/// Raw status and body returned by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Bytes,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// `true` for 2xx and 3xx statuses.
    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.status)
    }

    /// Turn a non-success status into [`Error::Status`].
    pub fn error_for_status(self) -> Result<Self, Error> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(Error::Status {
                status: self.status,
                body: String::from_utf8_lossy(&self.body).into_owned(),
            })
        }
    }
}
