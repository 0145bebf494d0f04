//! Authenticated HTTP session for the imagery provider.
//!
//! One cookie jar is shared by two blocking clients: a short-timeout client
//! for catalog calls and existence probes, and a long-timeout client for
//! band transfers. Logging out happens when the session is dropped.
use std::io::{Read, Write};
use std::sync::{Arc, LazyLock};
use std::thread;
use std::time::Duration;

use regex::Regex;
use reqwest::blocking::{Client, Response};
use reqwest::cookie::Jar;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::core::params::PipelineParams;
use crate::core::progress::CancelToken;
use crate::io::http::{AssetFetcher, AssetProbe, CatalogTransport, HttpError};

/// Chunk size used while streaming band files (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Base delay for exponential backoff between retries.
const RETRY_BASE_MS: u64 = 500;

static CSRF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<input[^>]*\bname\s*=\s*["']csrf["'][^>]*>"#).expect("Valid regex")
});

static VALUE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\bvalue\s*=\s*["']([^"']*)["']"#).expect("Valid regex"));

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub login_url: String,
    pub logout_url: String,
    pub probe_timeout: Duration,
    pub transfer_timeout: Duration,
    pub retries: u32,
}

impl From<&PipelineParams> for SessionConfig {
    fn from(p: &PipelineParams) -> Self {
        Self {
            login_url: p.login_url.clone(),
            logout_url: p.logout_url.clone(),
            probe_timeout: Duration::from_secs(p.probe_timeout_secs),
            transfer_timeout: Duration::from_secs(p.transfer_timeout_secs),
            retries: p.retries,
        }
    }
}

pub struct Session {
    probe_client: Client,
    transfer_client: Client,
    config: SessionConfig,
    authenticated: bool,
}

fn transport_error(url: &str, e: reqwest::Error) -> HttpError {
    if let Some(status) = e.status() {
        return HttpError::Status {
            status: status.as_u16(),
            url: url.to_string(),
        };
    }
    HttpError::Transport {
        url: url.to_string(),
        transient: e.is_timeout() || e.is_connect() || e.is_request(),
        reason: e.to_string(),
    }
}

fn check_status(url: &str, response: Response) -> Result<Response, HttpError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(HttpError::Status {
            status: status.as_u16(),
            url: url.to_string(),
        })
    }
}

/// Pulls the CSRF token out of the provider's login form
pub fn extract_csrf_token(html: &str) -> Option<String> {
    let tag = CSRF_RE.find(html)?;
    VALUE_RE
        .captures(tag.as_str())
        .map(|c| c[1].to_string())
        .filter(|v| !v.is_empty())
}

impl Session {
    /// Session without provider credentials. Catalog search and public
    /// assets work; protected downloads will fail with 4xx.
    pub fn anonymous(config: SessionConfig) -> Result<Self, HttpError> {
        let jar = Arc::new(Jar::default());
        let build = |timeout: Duration| {
            Client::builder()
                .timeout(timeout)
                .cookie_provider(jar.clone())
                .user_agent(concat!("landsatpro/", env!("CARGO_PKG_VERSION")))
                .build()
                .map_err(|e| HttpError::Transport {
                    url: String::new(),
                    reason: format!("Failed to create HTTP client: {}", e),
                    transient: false,
                })
        };
        Ok(Self {
            probe_client: build(config.probe_timeout)?,
            transfer_client: build(config.transfer_timeout)?,
            config,
            authenticated: false,
        })
    }

    /// Logs in through the provider's form, carrying the CSRF token.
    pub fn login(config: SessionConfig, credentials: &Credentials) -> Result<Self, HttpError> {
        let mut session = Self::anonymous(config)?;
        let url = session.config.login_url.clone();

        let page = session.with_retries(&url, || {
            let response = session
                .probe_client
                .get(&url)
                .send()
                .map_err(|e| transport_error(&url, e))?;
            check_status(&url, response)?
                .text()
                .map_err(|e| transport_error(&url, e))
        })?;
        let csrf = extract_csrf_token(&page)
            .ok_or_else(|| HttpError::Login("no CSRF token on the login page".into()))?;

        let form = [
            ("username", credentials.username.as_str()),
            ("password", credentials.password.as_str()),
            ("csrf", csrf.as_str()),
        ];
        let response = session
            .probe_client
            .post(&url)
            .form(&form)
            .send()
            .map_err(|e| transport_error(&url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(HttpError::Login(format!("login returned HTTP {}", status)));
        }
        // A successful login redirects away from the form
        if response.url().as_str().trim_end_matches('/') == url.trim_end_matches('/') {
            let body = response.text().unwrap_or_default();
            if extract_csrf_token(&body).is_some() {
                return Err(HttpError::Login("credentials rejected".into()));
            }
        }
        session.authenticated = true;
        info!("Logged in as {}", credentials.username);
        Ok(session)
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    fn with_retries<T>(
        &self,
        url: &str,
        mut op: impl FnMut() -> Result<T, HttpError>,
    ) -> Result<T, HttpError> {
        let mut attempt = 0u32;
        loop {
            match op() {
                Ok(v) => return Ok(v),
                Err(e) if e.is_transient() && attempt < self.config.retries => {
                    let delay = RETRY_BASE_MS * 2u64.pow(attempt);
                    warn!(
                        "{} failed ({}), retry {}/{} in {}ms",
                        url,
                        e,
                        attempt + 1,
                        self.config.retries,
                        delay
                    );
                    thread::sleep(Duration::from_millis(delay));
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn logout(&mut self) {
        if !self.authenticated {
            return;
        }
        let url = &self.config.logout_url;
        match self.probe_client.get(url).send() {
            Ok(r) => debug!("Logout returned {}", r.status()),
            Err(e) => warn!("Logout failed: {}", e),
        }
        self.authenticated = false;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.logout();
    }
}

impl CatalogTransport for Session {
    fn post_json(&self, url: &str, body: &Value) -> Result<Value, HttpError> {
        self.with_retries(url, || {
            let response = self
                .probe_client
                .post(url)
                .header(CONTENT_TYPE, "application/json")
                .header(ACCEPT, "application/geo+json")
                .json(body)
                .send()
                .map_err(|e| transport_error(url, e))?;
            let status = response.status();
            // The search service explains rejected queries in a JSON body
            if status.is_client_error() {
                let text = response.text().unwrap_or_default();
                return match serde_json::from_str::<Value>(&text) {
                    Ok(v) if v.get("message").is_some() => Ok(v),
                    _ => Err(HttpError::Status {
                        status: status.as_u16(),
                        url: url.to_string(),
                    }),
                };
            }
            check_status(url, response)?
                .json::<Value>()
                .map_err(|e| HttpError::InvalidResponse {
                    url: url.to_string(),
                    reason: e.to_string(),
                })
        })
    }
}

impl AssetProbe for Session {
    fn exists(&self, url: &str) -> Result<bool, HttpError> {
        self.with_retries(url, || {
            let response = self
                .probe_client
                .head(url)
                .send()
                .map_err(|e| transport_error(url, e))?;
            let status = response.status();
            if status.is_success() {
                Ok(true)
            } else if status.is_server_error() {
                Err(HttpError::Status {
                    status: status.as_u16(),
                    url: url.to_string(),
                })
            } else {
                Ok(false)
            }
        })
    }
}

impl AssetFetcher for Session {
    fn fetch(
        &self,
        url: &str,
        sink: &mut dyn Write,
        cancel: &CancelToken,
        progress: &mut dyn FnMut(u64, Option<u64>),
    ) -> Result<u64, HttpError> {
        let mut response = self.with_retries(url, || {
            let response = self
                .transfer_client
                .get(url)
                .send()
                .map_err(|e| transport_error(url, e))?;
            check_status(url, response)
        })?;

        let total = response.content_length();
        let mut buffer = vec![0u8; BUFFER_SIZE];
        let mut written = 0u64;
        loop {
            if cancel.is_cancelled() {
                return Err(HttpError::Cancelled);
            }
            let n = response.read(&mut buffer).map_err(|e| HttpError::Transport {
                url: url.to_string(),
                reason: e.to_string(),
                transient: true,
            })?;
            if n == 0 {
                break;
            }
            sink.write_all(&buffer[..n])?;
            written += n as u64;
            progress(written, total);
        }
        if let Some(expected) = total {
            if expected != written {
                return Err(HttpError::InvalidResponse {
                    url: url.to_string(),
                    reason: format!("expected {} bytes, received {}", expected, written),
                });
            }
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csrf_token_is_found_in_either_attribute_order() {
        let a = r#"<form><input type="hidden" name="csrf" value="abc123"/></form>"#;
        let b = r#"<input value='zz9' id="x" name='csrf'>"#;
        assert_eq!(extract_csrf_token(a).as_deref(), Some("abc123"));
        assert_eq!(extract_csrf_token(b).as_deref(), Some("zz9"));
        assert_eq!(extract_csrf_token("<input name=\"user\" value=\"x\">"), None);
    }

    #[test]
    fn credentials_debug_hides_password() {
        let c = Credentials {
            username: "me".into(),
            password: "secret".into(),
        };
        assert!(!format!("{:?}", c).contains("secret"));
    }

    #[test]
    fn anonymous_session_builds_without_network() {
        let session = Session::anonymous(SessionConfig::from(&PipelineParams::default())).unwrap();
        assert!(!session.is_authenticated());
    }
}
