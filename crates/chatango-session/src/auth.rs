//! One-shot account calls that live outside the streaming protocol.
//!
//! Logging into a room happens over the room socket (`bauth`). Two other
//! account operations go over plain HTTP instead: fetching an auth token
//! (the cookie the web client would store) and replacing the account's
//! avatar image. Neither shares any state with a running session.
//!
//! [`AccountService`] is the seam; [`HttpAccountService`] is the real
//! implementation and tests can substitute their own.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use reqwest::header::SET_COOKIE;
use reqwest::multipart::{Form, Part};
use secrecy::ExposeSecret;
use serde::Deserialize;

use crate::{Credentials, SessionError};

/// Name of the cookie carrying the auth token.
const AUTH_COOKIE: &str = "auth.chatango.com";

/// Account operations needing a registered name and password.
pub trait AccountService: Send + Sync + 'static {
    /// Logs in over HTTP and returns the auth token.
    fn request_auth_token(
        &self,
        credentials: &Credentials,
    ) -> impl Future<Output = Result<String, SessionError>> + Send;

    /// Replaces the account's avatar with the image at `path`.
    fn upload_avatar(
        &self,
        credentials: &Credentials,
        path: &Path,
    ) -> impl Future<Output = Result<(), SessionError>> + Send;
}

// ---------------------------------------------------------------------------
// AccountConfig
// ---------------------------------------------------------------------------

/// Endpoints and limits for [`HttpAccountService`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    pub login_url: String,
    pub avatar_url: String,
    /// Whole-request timeout.
    #[serde(with = "secs")]
    pub timeout: Duration,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            login_url: "https://chatango.com/login".into(),
            avatar_url: "https://chatango.com/updatepic".into(),
            timeout: Duration::from_secs(20),
        }
    }
}

/// Durations in config files are whole seconds.
pub(crate) mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

// ---------------------------------------------------------------------------
// HttpAccountService
// ---------------------------------------------------------------------------

/// [`AccountService`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpAccountService {
    client: reqwest::Client,
    config: AccountConfig,
}

impl HttpAccountService {
    pub fn new(config: AccountConfig) -> Result<Self, SessionError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self { client, config })
    }
}

fn registered(credentials: &Credentials) -> Result<(&str, &str), SessionError> {
    match (credentials.name(), credentials.password()) {
        (Some(name), Some(password)) => Ok((name, password.expose_secret())),
        _ => Err(SessionError::MissingCredentials),
    }
}

/// Finds the auth cookie among the `Set-Cookie` headers.
fn auth_cookie(headers: &reqwest::header::HeaderMap) -> Option<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|cookie| cookie.split(';').next()?.split_once('='))
        .find(|(name, value)| name.trim() == AUTH_COOKIE && !value.is_empty())
        .map(|(_, value)| value.trim().to_string())
}

impl AccountService for HttpAccountService {
    async fn request_auth_token(&self, credentials: &Credentials) -> Result<String, SessionError> {
        let (name, password) = registered(credentials)?;
        let response = self
            .client
            .post(&self.config.login_url)
            .form(&[
                ("user_id", name),
                ("password", password),
                ("storecookie", "on"),
                ("checkerrors", "yes"),
            ])
            .send()
            .await?;

        let token = auth_cookie(response.headers());
        match token {
            Some(token) => {
                tracing::info!(user = name, "auth token received");
                Ok(token)
            }
            None => {
                tracing::warn!(user = name, status = %response.status(), "login returned no auth cookie");
                Err(SessionError::LoginRejected(name.to_string()))
            }
        }
    }

    async fn upload_avatar(&self, credentials: &Credentials, path: &Path) -> Result<(), SessionError> {
        let (name, password) = registered(credentials)?;
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| SessionError::AvatarRead {
                path: path.display().to_string(),
                source,
            })?;
        let file_name = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| "avatar".into());

        let image = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(mime_for(path))?;
        let form = Form::new()
            .text("u", name.to_string())
            .text("p", password.to_string())
            .text("action", "fullpic")
            .part("Filedata", image);

        let response = self
            .client
            .post(&self.config.avatar_url)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?;
        tracing::info!(user = name, status = %response.status(), "avatar uploaded");
        Ok(())
    }
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        _ => "image/jpeg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue};

    #[test]
    fn test_auth_cookie_found_among_others() {
        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, HeaderValue::from_static("id.chatango.com=alice; Path=/"));
        headers.append(
            SET_COOKIE,
            HeaderValue::from_static("auth.chatango.com=TOKEN123; Path=/; HttpOnly"),
        );
        assert_eq!(auth_cookie(&headers).as_deref(), Some("TOKEN123"));
    }

    #[test]
    fn test_auth_cookie_empty_value_is_missing() {
        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, HeaderValue::from_static("auth.chatango.com=; Path=/"));
        assert_eq!(auth_cookie(&headers), None);
    }

    #[test]
    fn test_registered_requires_password() {
        assert!(matches!(
            registered(&Credentials::temporary("guest")),
            Err(SessionError::MissingCredentials)
        ));
    }

    #[test]
    fn test_mime_for_extension() {
        assert_eq!(mime_for(Path::new("a.PNG")), "image/png");
        assert_eq!(mime_for(Path::new("a.gif")), "image/gif");
        assert_eq!(mime_for(Path::new("a")), "image/jpeg");
    }
}
