//! Typed wrapper over the remote store's endpoints.
//!
//! | Operation | Method | Location | Success |
//! |---|---|---|---|
//! | upload | PUT | `/upload/{owner}/{collection}/{filename}` | 201 + `location` header |
//! | mutate | POST | `/api/{owner}/{collection}/{blob}` | 204 (share: 201 + header) |
//! | delete | DELETE | `/api/{owner}/{collection}/{blob}` | 204 |
//! | listing | GET | `...?json` | 200 + JSON document |
//!
//! Any 2xx answer counts as success; everything else is
//! [`ClientError::Rejected`].

use bytes::Bytes;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use hrb_shared::constants::HEADER_LOCATION;
use hrb_shared::{BlobId, Directive, DirectoryJson, ParseError};

use crate::error::{ClientError, Result};
use crate::network::{NetworkClient, Request, Response};

/// A file picked, dropped or pasted by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub name: String,
    pub mime: String,
    pub data: Bytes,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            data: data.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RemoteStore<C> {
    client: C,
}

impl<C: NetworkClient> RemoteStore<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    /// PUT a file; returns the id the store assigned to it.
    pub async fn upload(&self, location: &str, file: &UploadFile) -> Result<BlobId> {
        let resp = self
            .send(Request::put(location, file.data.clone(), file.mime.as_str()))
            .await?;
        let reference = resp
            .header(HEADER_LOCATION)
            .ok_or(ParseError::MissingHeader(HEADER_LOCATION))?;
        Ok(BlobId::from_reference(reference)?)
    }

    /// POST a directive to a blob or collection endpoint.
    pub async fn post(&self, location: &str, directive: &Directive) -> Result<Response> {
        self.send(Request::post_form(location, directive.encode()))
            .await
    }

    pub async fn delete(&self, location: &str) -> Result<()> {
        self.send(Request::delete(location)).await?;
        Ok(())
    }

    /// GET a directory document.
    pub async fn directory(&self, location: &str) -> Result<DirectoryJson> {
        let resp = self.send(Request::get(location)).await?;
        Ok(DirectoryJson::from_slice(&resp.body)?)
    }

    /// GET an arbitrary JSON document.
    pub async fn json<T: DeserializeOwned>(&self, location: &str) -> Result<T> {
        let resp = self.send(Request::get(location)).await?;
        Ok(serde_json::from_slice(&resp.body)?)
    }

    async fn send(&self, request: Request) -> Result<Response> {
        let method = request.method;
        let location = request.location.clone();
        debug!(%method, %location, "Sending request");

        let resp = self.client.request(request).await?;
        if !resp.is_success() {
            warn!(%method, %location, status = resp.status, "Request rejected");
            return Err(ClientError::Rejected {
                status: resp.status,
                body: resp.text(),
            });
        }
        Ok(resp)
    }
}
