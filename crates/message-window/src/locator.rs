use crate::error::WindowError;
use crate::gate::GateDenied;
use crate::loader::{FetchOutcome, SkipReason};
use crate::model::MessageId;
use crate::window::{ChatWindow, PendingTarget};
use serde::Serialize;
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum JumpOutcome {
    /// The target was already rendered; focused without fetching.
    AlreadyVisible,
    /// Fetched around the target and focused it after `attempts` checks.
    Focused { attempts: u32 },
    /// Another jump is already fetching, or a bulk operation is running.
    Busy { denied: GateDenied },
    Skipped { reason: SkipReason },
    /// The chat changed before the target could be shown.
    Stale,
}

impl ChatWindow {
    /// Brings message `target` into view, fetching around it when needed.
    ///
    /// Scroll-driven fetches are held back for the whole jump so user-scroll
    /// backfill cannot race the targeted load. Rendering may lag the fetch, so
    /// presence is polled a bounded number of times before giving up.
    pub async fn jump_to(&self, target: MessageId) -> Result<JumpOutcome, WindowError> {
        if self.view.exists(target) {
            trace!(target: "window::jump", target, "target already rendered");
            self.view.focus(target);
            return Ok(JumpOutcome::AlreadyVisible);
        }

        let _ambient = self.gate.suppress_ambient();
        let loaded = self.load_around(target).await;
        let early = match loaded {
            Ok(FetchOutcome::Loaded { received, .. }) => {
                debug!(target: "window::jump", target, received, "awaiting target render");
                None
            }
            Ok(FetchOutcome::Skipped {
                reason: SkipReason::Gate(denied),
            }) => Some(Ok(JumpOutcome::Busy { denied })),
            Ok(FetchOutcome::Skipped { reason }) => Some(Ok(JumpOutcome::Skipped { reason })),
            Ok(FetchOutcome::Stale { .. }) => Some(Ok(JumpOutcome::Stale)),
            Err(err) => Some(Err(err)),
        };
        if let Some(result) = early {
            return result;
        }

        let attempts = self.config.jump_poll_attempts;
        let session = {
            let mut state = self.state.lock();
            state.pending_target = Some(PendingTarget {
                target_id: target,
                attempts_remaining: attempts,
            });
            state.session
        };
        let interval = self.config.jump_poll_interval();
        for attempt in 1..=attempts {
            if self.session() != session {
                trace!(target: "window::jump", target, "window reset while waiting for target");
                return Ok(JumpOutcome::Stale);
            }
            if self.view.exists(target) {
                self.clear_pending(target);
                self.view.focus(target);
                debug!(target: "window::jump", target, attempts = attempt, "focused target");
                return Ok(JumpOutcome::Focused { attempts: attempt });
            }
            if let Some(pending) = self.state.lock().pending_target.as_mut()
                && pending.target_id == target
            {
                pending.attempts_remaining = attempts - attempt;
            }
            if attempt < attempts {
                tokio::time::sleep(interval).await;
            }
        }

        self.clear_pending(target);
        warn!(target: "window::jump", target, attempts, "target never materialized");
        Err(WindowError::TargetNotFound { target, attempts })
    }

    fn clear_pending(&self, target: MessageId) {
        let mut state = self.state.lock();
        if state
            .pending_target
            .is_some_and(|pending| pending.target_id == target)
        {
            state.pending_target = None;
        }
    }
}
