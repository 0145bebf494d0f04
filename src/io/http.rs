//! HTTP seams used by the pipeline.
//!
//! The catalog, the asset probe and the streaming fetcher are traits so the
//! stages can run against an authenticated [`Session`](crate::io::session::Session)
//! or an in-memory double in tests.
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

use crate::core::progress::CancelToken;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },
    #[error("request to {url} failed: {reason}")]
    Transport {
        url: String,
        reason: String,
        transient: bool,
    },
    #[error("invalid response from {url}: {reason}")]
    InvalidResponse { url: String, reason: String },
    #[error("login failed: {0}")]
    Login(String),
    #[error("transfer cancelled")]
    Cancelled,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HttpError {
    /// Server-side and timeout failures that are worth retrying
    pub fn is_transient(&self) -> bool {
        match self {
            HttpError::Status { status, .. } => *status >= 500 || *status == 429,
            HttpError::Transport { transient, .. } => *transient,
            _ => false,
        }
    }

    /// Client errors (4xx other than 429)
    pub fn is_permanent(&self) -> bool {
        matches!(self, HttpError::Status { status, .. } if (400..500).contains(status) && *status != 429)
    }
}

/// POSTs a JSON search body and returns the decoded JSON response.
pub trait CatalogTransport {
    fn post_json(&self, url: &str, body: &Value) -> Result<Value, HttpError>;
}

/// Checks whether a remote asset exists without downloading it.
pub trait AssetProbe {
    fn exists(&self, url: &str) -> Result<bool, HttpError>;
}

/// Streams a remote asset into a writer.
///
/// Implementations check `cancel` between chunks and report
/// `(bytes_so_far, total_if_known)` through `progress`.
pub trait AssetFetcher {
    fn fetch(
        &self,
        url: &str,
        sink: &mut dyn Write,
        cancel: &CancelToken,
        progress: &mut dyn FnMut(u64, Option<u64>),
    ) -> Result<u64, HttpError>;
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

/// Downloads `url` into `dest` through a `.part` file renamed on success.
/// A failed or cancelled transfer leaves nothing at `dest`.
pub fn download_to_file(
    fetcher: &dyn AssetFetcher,
    url: &str,
    dest: &Path,
    cancel: &CancelToken,
    progress: &mut dyn FnMut(u64, Option<u64>),
) -> Result<u64, HttpError> {
    if cancel.is_cancelled() {
        return Err(HttpError::Cancelled);
    }
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    let part = part_path(dest);
    let mut writer = BufWriter::new(File::create(&part)?);
    let outcome = fetcher
        .fetch(url, &mut writer, cancel, progress)
        .and_then(|n| writer.flush().map(|_| n).map_err(HttpError::from));
    drop(writer);
    match outcome {
        Ok(n) => {
            fs::rename(&part, dest)?;
            Ok(n)
        }
        Err(e) => {
            let _ = fs::remove_file(&part);
            Err(e)
        }
    }
}

/// Last path segment of a URL, without query or fragment
pub fn url_file_name(url: &str) -> Option<&str> {
    let no_query = url.split(['?', '#']).next().unwrap_or(url);
    no_query
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty() && !s.contains(':'))
}
