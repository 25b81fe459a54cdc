// src/services/file_source.rs

//! `MessageSource` backed by a JSON dump on disk.
//!
//! Useful for local runs and demos without a chat-network bridge.
//!
//! ```json
//! {
//!   "sources": {
//!     "anekdotcollection": {
//!       "broadcast": true,
//!       "messages": [{"kind": "text", "text": "..."}, null, {"kind": "service"}]
//!     }
//!   }
//! }
//! ```
//!
//! A message's position is its index in the `messages` array.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::models::{Message, Position, SourceHandle};
use crate::services::MessageSource;

#[derive(Debug, Clone, Deserialize)]
struct DumpedSource {
    #[serde(default = "default_broadcast")]
    broadcast: bool,
    #[serde(default)]
    messages: Vec<Option<Message>>,
}

fn default_broadcast() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
struct Dump {
    #[serde(default)]
    sources: HashMap<String, DumpedSource>,
}

/// Read-only message source loaded from a JSON file.
#[derive(Debug, Clone)]
pub struct FileMessageSource {
    /// Sources in load order; a handle's `peer_id` is the index here
    sources: Vec<(String, DumpedSource)>,
}

impl FileMessageSource {
    /// Load a dump file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = tokio::fs::read(path.as_ref()).await?;
        Self::from_slice(&bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let dump: Dump = serde_json::from_slice(bytes)?;
        let mut sources: Vec<_> = dump.sources.into_iter().collect();
        sources.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(Self { sources })
    }

    fn by_handle(&self, handle: &SourceHandle) -> Result<&DumpedSource> {
        usize::try_from(handle.peer_id)
            .ok()
            .and_then(|index| self.sources.get(index))
            .filter(|(id, _)| *id == handle.identifier)
            .map(|(_, source)| source)
            .ok_or_else(|| AppError::unresolved(&handle.identifier))
    }
}

#[async_trait]
impl MessageSource for FileMessageSource {
    async fn resolve_source(&self, identifier: &str) -> Result<SourceHandle> {
        self.sources
            .iter()
            .position(|(id, _)| id == identifier)
            .map(|index| SourceHandle {
                identifier: identifier.to_string(),
                peer_id: index as i64,
                broadcast: self.sources[index].1.broadcast,
            })
            .ok_or_else(|| AppError::unresolved(identifier))
    }

    async fn get_source_extent(&self, handle: &SourceHandle) -> Result<Position> {
        let source = self.by_handle(handle)?;
        if !source.broadcast {
            return Err(AppError::not_addressable(&handle.identifier));
        }
        Ok(source.messages.len() as Position)
    }

    async fn fetch_messages(
        &self,
        handle: &SourceHandle,
        positions: &[Position],
    ) -> Result<Vec<Option<Message>>> {
        let source = self.by_handle(handle)?;
        Ok(positions
            .iter()
            .map(|&position| {
                usize::try_from(position)
                    .ok()
                    .and_then(|index| source.messages.get(index))
                    .cloned()
                    .flatten()
            })
            .collect())
    }
}
