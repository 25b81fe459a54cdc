// src/services/source.rs

//! The message-fetch collaborator.
//!
//! The cache never talks to a chat network directly; it goes through a
//! `MessageSource`, which the binary wires to a concrete backend.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Result;
use crate::models::{Message, NewMessageEvent, Position, SourceHandle};

/// Backend able to resolve sources and fetch messages by position.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Resolve a configured identifier to a handle.
    async fn resolve_source(&self, identifier: &str) -> Result<SourceHandle>;

    /// Upper bound on valid positions.
    ///
    /// Fails with `SourceNotAddressable` for groups.
    async fn get_source_extent(&self, handle: &SourceHandle) -> Result<Position>;

    /// Messages at the given positions, `None` where nothing exists.
    ///
    /// The returned vector is aligned with `positions`.
    async fn fetch_messages(
        &self,
        handle: &SourceHandle,
        positions: &[Position],
    ) -> Result<Vec<Option<Message>>>;

    /// Live stream of new-message notifications, if the backend has one.
    fn subscribe_new_message_events(&self) -> Option<BoxStream<'static, NewMessageEvent>> {
        None
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory `MessageSource` for unit tests.

    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::StreamExt;
    use parking_lot::Mutex;
    use tokio::sync::mpsc;

    use super::*;
    use crate::error::AppError;

    #[derive(Debug, Clone)]
    pub struct MockChannel {
        pub peer_id: i64,
        pub broadcast: bool,
        pub extent: Position,
        /// Messages by position
        pub messages: HashMap<Position, Message>,
        /// Number of upcoming fetches that fail with a transient error
        pub failing_fetches: usize,
        /// Fixed reply for every fetch, ignoring the requested positions
        pub scripted: Option<Vec<Option<Message>>>,
    }

    impl MockChannel {
        pub fn broadcast(extent: Position) -> Self {
            Self {
                peer_id: 0,
                broadcast: true,
                extent,
                messages: HashMap::new(),
                failing_fetches: 0,
                scripted: None,
            }
        }

        pub fn group() -> Self {
            Self {
                broadcast: false,
                ..Self::broadcast(0)
            }
        }

        /// Fill every position below the extent with the same text.
        pub fn filled_with(extent: Position, text: &str) -> Self {
            let mut channel = Self::broadcast(extent);
            for position in 0..extent {
                channel
                    .messages
                    .insert(position, Message::text(format!("{text} {position}")));
            }
            channel
        }
    }

    #[derive(Default)]
    pub struct MockSource {
        pub channels: Mutex<HashMap<String, MockChannel>>,
        pub resolve_calls: AtomicUsize,
        pub extent_calls: AtomicUsize,
        pub fetch_calls: AtomicUsize,
        /// Position lists received by `fetch_messages`
        pub requested: Mutex<Vec<Vec<Position>>>,
        events: Mutex<Option<mpsc::UnboundedReceiver<NewMessageEvent>>>,
    }

    impl MockSource {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_channel(self, identifier: &str, channel: MockChannel) -> Self {
            self.channels.lock().insert(identifier.to_string(), channel);
            self
        }

        /// Enable the event stream; the returned sender feeds it.
        pub fn with_events(self) -> (Self, mpsc::UnboundedSender<NewMessageEvent>) {
            let (tx, rx) = mpsc::unbounded_channel();
            *self.events.lock() = Some(rx);
            (self, tx)
        }

        pub fn set_extent(&self, identifier: &str, extent: Position) {
            if let Some(channel) = self.channels.lock().get_mut(identifier) {
                channel.extent = extent;
            }
        }

        pub fn fail_next_fetches(&self, identifier: &str, count: usize) {
            if let Some(channel) = self.channels.lock().get_mut(identifier) {
                channel.failing_fetches = count;
            }
        }
    }

    #[async_trait]
    impl MessageSource for MockSource {
        async fn resolve_source(&self, identifier: &str) -> Result<SourceHandle> {
            self.resolve_calls.fetch_add(1, Ordering::SeqCst);
            let channels = self.channels.lock();
            let channel = channels
                .get(identifier)
                .ok_or_else(|| AppError::unresolved(identifier))?;
            Ok(SourceHandle {
                identifier: identifier.to_string(),
                peer_id: channel.peer_id,
                broadcast: channel.broadcast,
            })
        }

        async fn get_source_extent(&self, handle: &SourceHandle) -> Result<Position> {
            self.extent_calls.fetch_add(1, Ordering::SeqCst);
            if !handle.broadcast {
                return Err(AppError::not_addressable(&handle.identifier));
            }
            let channels = self.channels.lock();
            channels
                .get(&handle.identifier)
                .map(|c| c.extent)
                .ok_or_else(|| AppError::unresolved(&handle.identifier))
        }

        async fn fetch_messages(
            &self,
            handle: &SourceHandle,
            positions: &[Position],
        ) -> Result<Vec<Option<Message>>> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            self.requested.lock().push(positions.to_vec());

            let mut channels = self.channels.lock();
            let channel = channels
                .get_mut(&handle.identifier)
                .ok_or_else(|| AppError::unresolved(&handle.identifier))?;
            if channel.failing_fetches > 0 {
                channel.failing_fetches -= 1;
                return Err(AppError::fetch(&handle.identifier, "flood wait"));
            }
            if let Some(script) = &channel.scripted {
                return Ok((0..positions.len())
                    .map(|i| script.get(i).cloned().flatten())
                    .collect());
            }
            Ok(positions
                .iter()
                .map(|p| channel.messages.get(p).cloned())
                .collect())
        }

        fn subscribe_new_message_events(&self) -> Option<BoxStream<'static, NewMessageEvent>> {
            let rx = self.events.lock().take()?;
            Some(
                futures::stream::unfold(rx, |mut rx| async move {
                    rx.recv().await.map(|event| (event, rx))
                })
                .boxed(),
            )
        }
    }
}
