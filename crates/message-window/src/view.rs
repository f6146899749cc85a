use crate::gaps::GapMarker;
use crate::model::{MessageId, MessageRecord};
use serde::{Deserialize, Serialize};

/// Opaque reference to a rendered row, handed out by the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViewHandle(pub u64);

/// Where a batch of records lands relative to what is already rendered.
///
/// Batches are always passed in ascending ID order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "at", content = "anchor")]
pub enum Placement {
    /// Above everything currently rendered.
    Prepend,
    /// Below everything currently rendered (the live edge).
    Append,
    /// Directly below the row for the anchor message.
    After(MessageId),
    /// Centred on the anchor message; used when entering through a deep link.
    Around(MessageId),
}

/// The rendered message list.
///
/// Calls are made while the window's state lock is held, so implementations
/// must not call back into the window. Insertion may finish asynchronously;
/// [`ViewSink::exists`] reports whether a message has actually materialized.
pub trait ViewSink: Send + Sync {
    fn insert(&self, batch: &[MessageRecord], placement: Placement);

    fn exists(&self, id: MessageId) -> bool;

    fn position_of(&self, id: MessageId) -> Option<ViewHandle>;

    /// Drops every rendered row and gap marker.
    fn clear(&self);

    /// Replaces all gap markers with `markers`.
    fn replace_gap_markers(&self, markers: &[GapMarker]);

    /// Scrolls to and highlights the message.
    fn focus(&self, id: MessageId);
}
