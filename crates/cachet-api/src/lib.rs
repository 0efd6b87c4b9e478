// cachet-api: HTTP transport and JSON:API wire types for the cachet data layer

pub mod client;
pub mod error;
pub mod jsonapi;
pub mod request;
pub mod transport;

pub use client::{HttpTransport, StubResponses, StubTransport, join_url};
pub use error::Error;
pub use jsonapi::{ResourceIdentifier, ResourceObject};
pub use request::{
    ApiRequest, Credential, HttpMethod, JSON_API_MEDIA_TYPE, OperationKind, RawResponse,
};
pub use transport::{TlsMode, TransportConfig};
