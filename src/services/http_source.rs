// src/services/http_source.rs

//! `MessageSource` backed by a JSON bridge over HTTP.
//!
//! The bridge owns the chat-network session; this client only asks it to
//! resolve sources, report extents and fetch messages by position.
//!
//! ## Endpoints
//!
//! ```text
//! GET  {base}/sources/{identifier}        -> {"peer_id": i64, "broadcast": bool}
//! GET  {base}/sources/{peer_id}/extent    -> {"extent": u64}
//! POST {base}/sources/{peer_id}/messages  <- {"ids": [u64]}  -> [message | null]
//! ```

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{HttpBackendConfig, Message, Position, SourceHandle};
use crate::services::MessageSource;
use crate::utils::http;

#[derive(Debug, Deserialize)]
struct ResolveResponse {
    peer_id: i64,
    broadcast: bool,
}

#[derive(Debug, Deserialize)]
struct ExtentResponse {
    extent: Position,
}

#[derive(Debug, Serialize)]
struct FetchRequest<'a> {
    ids: &'a [Position],
}

/// HTTP bridge client.
pub struct HttpMessageSource {
    client: Client,
    base_url: Url,
}

impl HttpMessageSource {
    pub fn new(config: &HttpBackendConfig) -> Result<Self> {
        Ok(Self {
            client: http::create_async_client(config)?,
            base_url: Url::parse(&config.base_url)?,
        })
    }

    /// `{base}/sources/{segments...}` with each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| AppError::config("backend.base_url cannot be a base"))?;
            path.pop_if_empty().push("sources").extend(segments);
        }
        Ok(url)
    }

    fn check_status(context: &str, status: StatusCode) -> Result<()> {
        if status.is_success() {
            Ok(())
        } else {
            Err(AppError::fetch(context, format!("bridge returned {status}")))
        }
    }
}

#[async_trait]
impl MessageSource for HttpMessageSource {
    async fn resolve_source(&self, identifier: &str) -> Result<SourceHandle> {
        let url = self.endpoint(&[identifier])?;
        let response = self.client.get(url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(AppError::unresolved(identifier));
        }
        Self::check_status(identifier, response.status())?;

        let resolved: ResolveResponse = response.json().await?;
        Ok(SourceHandle {
            identifier: identifier.to_string(),
            peer_id: resolved.peer_id,
            broadcast: resolved.broadcast,
        })
    }

    async fn get_source_extent(&self, handle: &SourceHandle) -> Result<Position> {
        if !handle.broadcast {
            return Err(AppError::not_addressable(&handle.identifier));
        }
        let peer = handle.peer_id.to_string();
        let url = self.endpoint(&[peer.as_str(), "extent"])?;
        let response = self.client.get(url).send().await?;
        Self::check_status(&handle.identifier, response.status())?;

        let body: ExtentResponse = response.json().await?;
        Ok(body.extent)
    }

    async fn fetch_messages(
        &self,
        handle: &SourceHandle,
        positions: &[Position],
    ) -> Result<Vec<Option<Message>>> {
        let peer = handle.peer_id.to_string();
        let url = self.endpoint(&[peer.as_str(), "messages"])?;
        let response = self
            .client
            .post(url)
            .json(&FetchRequest { ids: positions })
            .send()
            .await?;
        Self::check_status(&handle.identifier, response.status())?;

        let mut messages: Vec<Option<Message>> = response.json().await?;
        // Keep the reply aligned with the request even if the bridge trims it.
        messages.resize(positions.len(), None);
        Ok(messages)
    }
}
