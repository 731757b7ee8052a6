use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use imgrelay_core::config::RemoteConfig;
use imgrelay_core::{Error, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};

use super::{join_url, ObjectBackend};

/// WebDAV client over reqwest with basic auth and a per-request timeout.
pub struct WebDavBackend {
    client: Client,
    base_url: String,
    username: Option<String>,
    password: Option<String>,
}

impl WebDavBackend {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::Config(format!("invalid remote header name '{name}': {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| Error::Config(format!("invalid value for remote header '{name}': {e}")))?;
            headers.insert(name, value);
        }

        let mut builder = Client::builder().default_headers(headers);
        if config.timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.timeout_secs));
        }
        let client = builder
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let req = self.client.request(method, join_url(&self.base_url, path));
        match &self.username {
            Some(user) => req.basic_auth(user, self.password.as_ref()),
            None => req,
        }
    }

    async fn send(&self, req: RequestBuilder, op: &str, path: &str) -> Result<Response> {
        req.send()
            .await
            .map_err(|e| Error::remote(format!("{op} {path}: {e}")))
    }
}

fn unexpected(op: &str, path: &str, status: StatusCode) -> Error {
    Error::remote(format!("{op} {path}: server returned {status}"))
}

#[async_trait]
impl ObjectBackend for WebDavBackend {
    async fn put(&self, path: &str, body: Bytes) -> Result<()> {
        let req = self
            .request(Method::PUT, path)
            .header("Overwrite", "T")
            .body(body);
        let resp = self.send(req, "PUT", path).await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(unexpected("PUT", path, resp.status()))
        }
    }

    async fn head(&self, path: &str) -> Result<bool> {
        let resp = self.send(self.request(Method::HEAD, path), "HEAD", path).await?;
        match resp.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => Err(unexpected("HEAD", path, s)),
        }
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let resp = self
            .send(self.request(Method::DELETE, path), "DELETE", path)
            .await?;
        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => {
                tracing::debug!(path, "object already absent");
                Ok(())
            }
            s => Err(unexpected("DELETE", path, s)),
        }
    }

    async fn ensure_collection(&self, path: &str) -> Result<()> {
        let mkcol = Method::from_bytes(b"MKCOL")
            .map_err(|e| Error::Internal(format!("invalid method: {e}")))?;
        let path = format!("{}/", path.trim_end_matches('/'));
        let resp = self.send(self.request(mkcol, &path), "MKCOL", &path).await?;
        match resp.status() {
            // 405: the collection already exists.
            s if s.is_success() || s == StatusCode::METHOD_NOT_ALLOWED => Ok(()),
            s => Err(unexpected("MKCOL", &path, s)),
        }
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}
