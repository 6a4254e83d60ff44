use crate::shortener::v1::{ResolveRequest, StatisticsResponse};
use thiserror::Error;
use tinylink_core as core;

#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("short code is required")]
    MissingCode,
    #[error("short code is malformed: {0}")]
    MalformedCode(String),
}

/// Parses a short code received on the wire.
pub(crate) fn parse_code(code: &str) -> Result<core::ShortCode, ConversionError> {
    if code.is_empty() {
        return Err(ConversionError::MissingCode);
    }
    core::ShortCode::new(code).map_err(|_| ConversionError::MalformedCode(code.to_string()))
}

impl TryFrom<&ResolveRequest> for core::ShortCode {
    type Error = ConversionError;

    fn try_from(request: &ResolveRequest) -> Result<Self, Self::Error> {
        parse_code(&request.short_code)
    }
}

impl crate::shortener::v1::DeleteUrlsRequest {
    /// Validates every requested code, failing on the first malformed one.
    pub fn codes(&self) -> Result<Vec<core::ShortCode>, ConversionError> {
        self.short_codes.iter().map(|code| parse_code(code)).collect()
    }
}

impl From<core::Statistics> for StatisticsResponse {
    fn from(stats: core::Statistics) -> Self {
        Self {
            urls: stats.urls,
            users: stats.users,
        }
    }
}
