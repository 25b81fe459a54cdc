// src/services/filter.rs

//! Filter policy deciding which fetched messages become pool items.

use crate::models::Message;

/// Marker that disqualifies a text (mentions and channel ads).
const MENTION_MARKER: char = '@';

/// Whether a text may be served.
///
/// Rejects blank texts and anything carrying a mention.
pub fn is_acceptable_text(text: &str) -> bool {
    !text.trim().is_empty() && !text.contains(MENTION_MARKER)
}

/// Text of a fetched message if it passes the policy.
///
/// Missing messages, media and service entries never qualify.
pub fn accept(message: Option<&Message>) -> Option<&str> {
    message
        .and_then(Message::as_text)
        .filter(|text| is_acceptable_text(text))
}

/// Apply the policy to a fetched batch, keeping survivors in order.
pub fn filter_batch(messages: &[Option<Message>]) -> Vec<&str> {
    messages.iter().filter_map(|m| accept(m.as_ref())).collect()
}
