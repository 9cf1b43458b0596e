use displaydoc::Display;
use thiserror::Error;

#[derive(Clone, Debug, Display, Error, PartialEq)]
pub enum Error {
    /// Fetch error
    Fetch,
    /// Server returned non 200 code: {0}
    HttpCode(u16),
    /// Manifest rejected: {0}
    Manifest(String),
    /// Config overrides rejected: {0}
    Config(String),
    /// Mount failed: {0}
    Mount(String),
    /// Player SDK unavailable: {0}
    Sdk(String),
    /// Player call failed: {0}
    PlayerCall(String),
    /// Element not found: {0}
    MissingElement(String),
    /// Channel closed
    ChannelClosed,
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        tracing::debug!(?error, "Request failed.");
        Error::Fetch
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::Manifest(error.to_string())
    }
}
