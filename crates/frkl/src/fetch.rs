//! Fetching raw text for file and URL sources

use crate::error::{Error, Result};
use std::path::Path;

/// Upper bound for remote configuration documents.
const MAX_REMOTE_SIZE: u64 = 4 * 1024 * 1024;

/// Provider of raw source text.
///
/// The resolver only deals with text; where it comes from is up to the
/// implementation, which keeps resolution testable without network access.
pub trait Fetcher {
    /// Read a local file.
    fn fetch_path(&self, path: &Path) -> Result<String> {
        log::debug!("Opening as file: {}", path.display());
        std::fs::read_to_string(path).map_err(|source| Error::Read {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Download a remote document.
    fn fetch_url(&self, url: &str) -> Result<String>;
}

/// Fetcher backed by the local filesystem and HTTP.
pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl HttpFetcher {
    /// Create a fetcher with default agent settings.
    pub fn new() -> Self {
        Self {
            agent: ureq::Agent::new_with_defaults(),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Fetcher for HttpFetcher {
    fn fetch_url(&self, url: &str) -> Result<String> {
        log::debug!("Opening as url: {url}");
        let fetch_error = |e: ureq::Error| Error::Fetch {
            url: url.to_string(),
            message: e.to_string(),
        };

        let mut response = self
            .agent
            .get(url)
            .header("User-Agent", "freckles")
            .call()
            .map_err(fetch_error)?;

        response
            .body_mut()
            .with_config()
            .limit(MAX_REMOTE_SIZE)
            .read_to_string()
            .map_err(fetch_error)
    }
}

/// Fetcher that refuses remote locations, for offline use.
pub struct LocalFetcher;

impl Fetcher for LocalFetcher {
    fn fetch_url(&self, url: &str) -> Result<String> {
        Err(Error::Fetch {
            url: url.to_string(),
            message: "remote sources are disabled".to_string(),
        })
    }
}
