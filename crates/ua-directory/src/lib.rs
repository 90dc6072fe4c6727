//! User directory lookups.
//!
//! The directory is an external service that knows users' display names and
//! handles. Profiles are enriched from it opportunistically: a failed or
//! disabled lookup never blocks ingest.

use std::future::Future;
use std::time::Duration;

use reqwest::{StatusCode, Url};
use serde::Deserialize;
use thiserror::Error;
use ua_core::{ProfileHint, UserId};

/// Default request timeout for directory calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Directory errors.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// The configured base URL is unusable.
    #[error("invalid directory URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    /// Failed to build HTTP client.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    /// HTTP request failed.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// The directory answered with an error status.
    #[error("directory error: {message}")]
    Api { message: String },
    /// Failed to parse response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Source of display names and handles.
pub trait DirectoryLookup: Send + Sync {
    /// Looks up a user. `Ok(None)` means the directory does not know them.
    fn get_profile_hint(
        &self,
        user_id: &UserId,
    ) -> impl Future<Output = Result<Option<ProfileHint>, DirectoryError>> + Send;
}

/// HTTP directory client.
///
/// Issues `GET {base}/users/{user_id}` and expects a JSON object with
/// `display_name`/`handle` (or `first_name`/`username`).
///
/// # Thread Safety
///
/// The client is safe to clone and share across threads. Each clone shares
/// the underlying HTTP connection pool.
#[derive(Debug, Clone)]
pub struct HttpDirectory {
    http: reqwest::Client,
    base: Url,
}

impl HttpDirectory {
    /// Creates a client for the directory at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is not an absolute http(s) URL, or if the
    /// HTTP client fails to build.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, DirectoryError> {
        let invalid = |reason: String| DirectoryError::InvalidUrl {
            url: base_url.to_string(),
            reason,
        };
        let base = Url::parse(base_url.trim()).map_err(|err| invalid(err.to_string()))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(invalid("scheme must be http or https".to_string()));
        }
        if base.cannot_be_a_base() {
            return Err(invalid("URL cannot be a base".to_string()));
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(DirectoryError::ClientBuild)?;

        Ok(Self { http, base })
    }

    fn user_url(&self, user_id: &UserId) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .push("users")
                .push(user_id.as_str());
        }
        url
    }
}

impl DirectoryLookup for HttpDirectory {
    async fn get_profile_hint(
        &self,
        user_id: &UserId,
    ) -> Result<Option<ProfileHint>, DirectoryError> {
        let url = self.user_url(user_id);
        tracing::debug!(%url, "directory lookup");

        let response = self.http.get(url).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = response.text().await?;
        if !status.is_success() {
            return Err(DirectoryError::Api {
                message: format!("status {status}: {body}"),
            });
        }

        parse_entry(&body).map(|hint| Some(hint).filter(|hint| !hint.is_empty()))
    }
}

/// The configured directory, or none at all.
#[derive(Debug, Clone, Default)]
pub enum Directory {
    #[default]
    Disabled,
    Http(HttpDirectory),
}

impl Directory {
    /// Builds an HTTP directory when a URL is configured.
    pub fn from_url(url: Option<&str>, timeout: Duration) -> Result<Self, DirectoryError> {
        match url.map(str::trim).filter(|url| !url.is_empty()) {
            Some(url) => Ok(Self::Http(HttpDirectory::new(url, timeout)?)),
            None => Ok(Self::Disabled),
        }
    }

    pub const fn is_enabled(&self) -> bool {
        matches!(self, Self::Http(_))
    }
}

impl DirectoryLookup for Directory {
    async fn get_profile_hint(
        &self,
        user_id: &UserId,
    ) -> Result<Option<ProfileHint>, DirectoryError> {
        match self {
            Self::Disabled => Ok(None),
            Self::Http(http) => http.get_profile_hint(user_id).await,
        }
    }
}

fn parse_entry(body: &str) -> Result<ProfileHint, DirectoryError> {
    #[derive(Deserialize)]
    struct Entry {
        #[serde(default, alias = "first_name")]
        display_name: Option<String>,
        #[serde(default, alias = "username")]
        handle: Option<String>,
    }

    let invalid = |err: serde_json::Error| DirectoryError::InvalidResponse(err.to_string());
    // Derived structs also accept positional arrays; only an object is a user.
    let fields = serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(body)
        .map_err(invalid)?;
    let entry: Entry =
        serde_json::from_value(serde_json::Value::Object(fields)).map_err(invalid)?;
    Ok(ProfileHint {
        display_name: entry.display_name,
        handle: entry.handle,
    }
    .normalized())
}
