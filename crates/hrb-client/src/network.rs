//! Transport seam between the client core and the remote store.
//!
//! The core only needs status codes, a header naming newly created
//! resources, and raw bodies, so [`NetworkClient`] is deliberately small.
//! [`HttpClient`] implements it with reqwest; tests substitute a scripted
//! client.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use hrb_shared::constants::FORM_CONTENT_TYPE;

use crate::error::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Put,
    Post,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Get => "GET",
            Self::Put => "PUT",
            Self::Post => "POST",
            Self::Delete => "DELETE",
        })
    }
}

/// One request against the store. `location` is a path with query, relative
/// to the store's base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub location: String,
    pub body: Option<Bytes>,
    pub content_type: Option<String>,
}

impl Request {
    pub fn get(location: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            location: location.into(),
            body: None,
            content_type: None,
        }
    }

    pub fn delete(location: impl Into<String>) -> Self {
        Self {
            method: Method::Delete,
            ..Self::get(location)
        }
    }

    pub fn put(location: impl Into<String>, body: Bytes, content_type: impl Into<String>) -> Self {
        Self {
            method: Method::Put,
            location: location.into(),
            body: Some(body),
            content_type: Some(content_type.into()),
        }
    }

    /// POST of a form-encoded body.
    pub fn post_form(location: impl Into<String>, form: String) -> Self {
        Self {
            method: Method::Post,
            location: location.into(),
            body: Some(Bytes::from(form)),
            content_type: Some(FORM_CONTENT_TYPE.to_string()),
        }
    }

    /// The body as UTF-8 text, if any.
    pub fn body_text(&self) -> Option<&str> {
        self.body.as_deref().and_then(|b| std::str::from_utf8(b).ok())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl Response {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Issues requests against the remote store.
#[async_trait]
pub trait NetworkClient: Send + Sync {
    async fn request(&self, request: Request) -> Result<Response, TransportError>;
}

#[async_trait]
impl<T: NetworkClient + ?Sized> NetworkClient for Arc<T> {
    async fn request(&self, request: Request) -> Result<Response, TransportError> {
        (**self).request(request).await
    }
}

/// reqwest-backed [`NetworkClient`].
#[derive(Debug, Clone)]
pub struct HttpClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl NetworkClient for HttpClient {
    async fn request(&self, request: Request) -> Result<Response, TransportError> {
        let url = format!("{}{}", self.base_url, request.location);
        debug!(method = %request.method, url = %url, "Issuing request");

        let mut builder = match request.method {
            Method::Get => self.http.get(&url),
            Method::Put => self.http.put(&url),
            Method::Post => self.http.post(&url),
            Method::Delete => self.http.delete(&url),
        };
        if let Some(content_type) = request.content_type {
            builder = builder.header(CONTENT_TYPE, content_type);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let resp = builder.send().await?;
        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = resp.bytes().await?;

        debug!(url = %url, status, len = body.len(), "Response received");
        Ok(Response {
            status,
            headers,
            body,
        })
    }
}
