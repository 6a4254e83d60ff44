use crate::subnet::TrustedSubnet;
use std::sync::Arc;
use tinylink_core::{ShortCode, Shortener};
use tinylink_session::SessionResolver;

#[derive(Clone)]
pub struct AppState {
    shortener: Arc<dyn Shortener>,
    sessions: SessionResolver,
    base_url: Arc<str>,
    trusted_subnet: Option<TrustedSubnet>,
}

impl AppState {
    pub fn new(
        shortener: Arc<dyn Shortener>,
        sessions: SessionResolver,
        public_base_url: impl Into<String>,
    ) -> Self {
        let base_url: String = public_base_url.into();
        Self {
            shortener,
            sessions,
            base_url: base_url.trim_end_matches('/').into(),
            trusted_subnet: None,
        }
    }

    pub fn with_trusted_subnet(mut self, subnet: Option<TrustedSubnet>) -> Self {
        self.trusted_subnet = subnet;
        self
    }

    pub fn shortener(&self) -> &dyn Shortener {
        self.shortener.as_ref()
    }

    pub fn sessions(&self) -> &SessionResolver {
        &self.sessions
    }

    pub fn trusted_subnet(&self) -> Option<&TrustedSubnet> {
        self.trusted_subnet.as_ref()
    }

    /// Absolute short url for `code`.
    pub fn short_url(&self, code: &ShortCode) -> String {
        code.to_url(&self.base_url)
    }
}
