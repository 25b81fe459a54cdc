// src/pipeline/extent.rs

//! Live extent tracking from new-message events.

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::task::JoinHandle;

use crate::models::NewMessageEvent;
use crate::services::{MessageSource, SourceState};

/// Subscribe to the source's events and follow them in a background task.
///
/// Returns `None` when the backend has no event stream; extents then only
/// change when they are queried. While the task runs every state is marked
/// tracked. When the stream ends the mark is cleared and the crawler goes
/// back to querying extents on each run.
pub fn spawn_extent_tracker(
    source: &dyn MessageSource,
    states: Vec<Arc<SourceState>>,
) -> Option<JoinHandle<()>> {
    let events = source.subscribe_new_message_events()?;
    log::info!("Following new-message events for {} sources", states.len());
    for state in &states {
        state.set_tracked(true);
    }

    Some(tokio::spawn(async move {
        let applied = track_extents(events, states.clone()).await;
        for state in &states {
            state.set_tracked(false);
        }
        log::warn!(
            "New-message stream ended after {} updates; querying extents on every run",
            applied
        );
    }))
}

/// Increment the matching source's extent for every event.
///
/// Events for unconfigured sources, or for sources whose extent was never
/// queried, are ignored. Returns the number of increments applied.
pub async fn track_extents(
    mut events: BoxStream<'static, NewMessageEvent>,
    states: Vec<Arc<SourceState>>,
) -> u64 {
    let by_id: HashMap<String, Arc<SourceState>> = states
        .into_iter()
        .map(|state| (state.identifier().to_string(), state))
        .collect();

    let mut applied = 0;
    while let Some(event) = events.next().await {
        match by_id.get(&event.source) {
            Some(state) if state.record_new_message() => applied += 1,
            Some(_) => log::debug!("Extent of '{}' not known yet", event.source),
            None => {}
        }
    }
    applied
}
