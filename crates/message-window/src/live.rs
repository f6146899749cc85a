use crate::model::MessageRecord;
use crate::view::Placement;
use crate::window::ChatWindow;
use serde::Serialize;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LiveOutcome {
    /// First message of an empty window.
    Started,
    /// Directly followed the newest covered message.
    Extended,
    /// Arrived out of order; shown, but separated from coverage by a gap.
    Detached,
    Duplicate,
    ForeignChat,
    NoActiveChat,
}

impl ChatWindow {
    /// Handles a message pushed by the real-time channel.
    ///
    /// Only a message that directly follows the newest covered ID extends the
    /// live edge. Anything else is still shown but enters coverage as its own
    /// run, so the missing span in between shows up as a gap marker until a
    /// newer-ward fetch fills it.
    pub fn on_new_message(&self, message: MessageRecord) -> LiveOutcome {
        let mut state = self.state.lock();
        let Some(chat) = state.chat else {
            return LiveOutcome::NoActiveChat;
        };
        if message.chat != chat {
            trace!(target: "window::live", %chat, other = %message.chat, id = message.id, "push for inactive chat");
            return LiveOutcome::ForeignChat;
        }
        let id = message.id;
        if state.coverage.contains(id) {
            trace!(target: "window::live", id, "duplicate push");
            return LiveOutcome::Duplicate;
        }

        let outcome = match state.coverage.newest_id() {
            None => LiveOutcome::Started,
            Some(newest) if newest.checked_add(1) == Some(id) => LiveOutcome::Extended,
            Some(_) => LiveOutcome::Detached,
        };
        self.absorb_locked(&mut state, std::slice::from_ref(&message), Placement::Append);
        if outcome == LiveOutcome::Detached {
            debug!(
                target: "window::live",
                id,
                newest = ?state.coverage.newest_id(),
                gaps = state.gaps.len(),
                "out-of-order push left a gap"
            );
        }
        outcome
    }
}
