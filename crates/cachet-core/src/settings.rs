// ── Runtime settings ──
//
// Where requests go and how they authenticate. Held behind an `ArcSwap`
// by the backend, replaced wholesale on change, and snapshotted once per
// request when it is issued.

use secrecy::SecretString;
use url::Url;

use cachet_api::Credential;

pub const DEFAULT_TOKEN_SCHEME: &str = "Bearer";

#[derive(Debug, Clone)]
pub struct Settings {
    /// Base address every operation path is appended to.
    pub base_url: Option<Url>,
    pub token: Option<SecretString>,
    /// Authorization scheme placed before the token.
    pub token_scheme: String,
    /// Answer requests from stub bodies instead of the network.
    pub testing: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: None,
            token: None,
            token_scheme: DEFAULT_TOKEN_SCHEME.to_owned(),
            testing: false,
        }
    }
}

impl Settings {
    pub fn with_base_url(mut self, url: Url) -> Self {
        self.base_url = Some(url);
        self
    }

    pub fn with_token(mut self, token: SecretString) -> Self {
        self.token = Some(token);
        self
    }

    pub fn with_testing(mut self, testing: bool) -> Self {
        self.testing = testing;
        self
    }

    /// The credential attached to outgoing requests, if a token is set.
    pub fn credential(&self) -> Option<Credential> {
        self.token
            .clone()
            .map(|token| Credential::with_scheme(self.token_scheme.clone(), token))
    }
}
