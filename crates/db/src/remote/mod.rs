//! HTTP access to the hosted table/auth service.
//!
//! Tables are served PostgREST-style under `rest/v1/`, authentication
//! GoTrue-style under `auth/v1/`. Both share one `RemoteClient` so requests
//! made after sign-in carry the user's access token.

pub mod auth;
pub mod gateway;

use std::sync::RwLock;

use reqwest::{Method, RequestBuilder};
use serde_json::Value;
use url::Url;

#[derive(Debug)]
pub struct RemoteClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: String,
    access_token: RwLock<Option<String>>,
}

impl RemoteClient {
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Result<Self, url::ParseError> {
        // `Url::join` drops the last path segment unless it ends with a slash.
        let mut base = base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        Ok(Self {
            http: reqwest::Client::new(),
            base_url: Url::parse(&base)?,
            api_key: api_key.into(),
            access_token: RwLock::new(None),
        })
    }

    pub(crate) fn endpoint(&self, path: &str) -> Result<Url, url::ParseError> {
        self.base_url.join(path)
    }

    pub(crate) fn set_access_token(&self, token: Option<String>) {
        *self
            .access_token
            .write()
            .unwrap_or_else(|err| err.into_inner()) = token;
    }

    /// Builds a request carrying the project key and the current bearer token
    /// (the user's access token when signed in, the project key otherwise).
    pub(crate) fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let token = self
            .access_token
            .read()
            .unwrap_or_else(|err| err.into_inner())
            .clone()
            .unwrap_or_else(|| self.api_key.clone());
        self.http
            .request(method, url)
            .header("apikey", &self.api_key)
            .bearer_auth(token)
    }
}

/// Pulls a human-readable message out of an error body.
pub(crate) fn error_message(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    parsed
        .as_ref()
        .and_then(|value| {
            ["message", "msg", "error_description", "error"]
                .iter()
                .find_map(|key| value.get(*key).and_then(Value::as_str))
        })
        .map(str::to_string)
        .unwrap_or_else(|| body.trim().to_string())
}
