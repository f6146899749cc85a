//! History fetching: initial load, older-ward and newer-ward paging, and the
//! bidirectional load around a deep-link target.
//!
//! Every mode follows the same shape: read the cursor under the state lock,
//! take the mode's [`FetchPermit`](crate::gate::FetchPermit), await the source,
//! then re-lock and drop the response if the session moved on while it was in
//! flight. Failures leave coverage untouched and are never retried here.

use crate::error::WindowError;
use crate::gate::{FetchMode, GateDenied};
use crate::model::{ChatTarget, MessageId, MessageRecord, SessionToken};
use crate::source::FetchRequest;
use crate::view::Placement;
use crate::window::{ChatWindow, WindowState, normalize};
use serde::Serialize;
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum FetchOutcome {
    Loaded {
        mode: FetchMode,
        received: usize,
        inserted: usize,
    },
    Skipped {
        reason: SkipReason,
    },
    /// The response belonged to a session that has since been reset.
    Stale {
        issued: SessionToken,
        current: SessionToken,
    },
}

impl FetchOutcome {
    pub fn is_loaded(&self) -> bool {
        matches!(self, FetchOutcome::Loaded { .. })
    }

    fn skipped(reason: SkipReason) -> Self {
        FetchOutcome::Skipped { reason }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoActiveChat,
    NoCoverage,
    ReachedOldest,
    ReachedNewest,
    NotNearEdge,
    Gate(GateDenied),
}

/// Where the user is scrolled to, as reported by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, serde::Deserialize)]
pub struct ScrollSnapshot {
    /// Distance in px between the viewport top and the top of the content.
    pub from_top: f32,
    /// Distance in px between the viewport bottom and the bottom of the content.
    pub from_bottom: f32,
    /// Newest message currently rendered inside the viewport.
    pub last_visible: Option<MessageId>,
}

#[derive(Debug, Clone, Copy)]
struct NewerPlan {
    cursor: MessageId,
    /// The anchor interval is followed by a later one; this fetch backfills the gap.
    fills_gap: bool,
}

impl ChatWindow {
    /// Resets the window onto `chat` and loads the most recent page.
    pub async fn open_chat(&self, chat: ChatTarget) -> Result<FetchOutcome, WindowError> {
        let session = self.switch_chat(chat);
        let _permit = match self.gate.try_acquire(FetchMode::Initial) {
            Ok(permit) => permit,
            Err(denied) => return Ok(FetchOutcome::skipped(SkipReason::Gate(denied))),
        };
        let page_size = self.config.page_size;
        let request = FetchRequest::latest(chat, page_size);
        let result = self.issue(FetchMode::Initial, &request).await;

        let mut state = self.state.lock();
        if let Some(stale) = stale(&state, session) {
            return Ok(stale);
        }
        let records = normalize(result?, chat);
        let inserted = self.absorb_locked(&mut state, &records, Placement::Append);
        state.has_reached_newest = true;
        state.has_reached_oldest = records.len() < page_size as usize;
        debug!(
            target: "window::fetch",
            %chat,
            received = records.len(),
            reached_oldest = state.has_reached_oldest,
            "initial page loaded"
        );
        Ok(FetchOutcome::Loaded {
            mode: FetchMode::Initial,
            received: records.len(),
            inserted,
        })
    }

    /// Pages in history above the globally oldest covered message.
    pub async fn load_older(&self) -> Result<FetchOutcome, WindowError> {
        let (session, chat, cursor) = {
            let state = self.state.lock();
            let Some(chat) = state.chat else {
                return Ok(FetchOutcome::skipped(SkipReason::NoActiveChat));
            };
            if state.has_reached_oldest {
                return Ok(FetchOutcome::skipped(SkipReason::ReachedOldest));
            }
            let Some(cursor) = state.coverage.oldest_id() else {
                return Ok(FetchOutcome::skipped(SkipReason::NoCoverage));
            };
            (state.session, chat, cursor)
        };
        let _permit = match self.gate.try_acquire(FetchMode::OlderWard) {
            Ok(permit) => permit,
            Err(denied) => return Ok(FetchOutcome::skipped(SkipReason::Gate(denied))),
        };
        let page_size = self.config.page_size;
        let request = FetchRequest::older(chat, page_size, cursor);
        let result = self.issue(FetchMode::OlderWard, &request).await;

        let mut state = self.state.lock();
        if let Some(stale) = stale(&state, session) {
            return Ok(stale);
        }
        let records = normalize(result?, chat);
        let inserted = self.absorb_locked(&mut state, &records, Placement::Prepend);
        if records.len() < page_size as usize {
            debug!(target: "window::fetch", %chat, cursor, received = records.len(), "reached oldest message");
            state.has_reached_oldest = true;
        }
        Ok(FetchOutcome::Loaded {
            mode: FetchMode::OlderWard,
            received: records.len(),
            inserted,
        })
    }

    /// Pages in history below the interval holding `anchor` (the newest
    /// message visible in the viewport). When that interval is followed by a
    /// gap, the fetch backfills exactly that gap rather than the live edge.
    pub async fn load_newer(&self, anchor: Option<MessageId>) -> Result<FetchOutcome, WindowError> {
        let (session, chat, plan) = {
            let state = self.state.lock();
            let Some(chat) = state.chat else {
                return Ok(FetchOutcome::skipped(SkipReason::NoActiveChat));
            };
            if state.coverage.is_empty() {
                return Ok(FetchOutcome::skipped(SkipReason::NoCoverage));
            }
            let Some(plan) = plan_newer(&state, anchor) else {
                return Ok(FetchOutcome::skipped(SkipReason::ReachedNewest));
            };
            (state.session, chat, plan)
        };
        let _permit = match self.gate.try_acquire(FetchMode::NewerWard) {
            Ok(permit) => permit,
            Err(denied) => return Ok(FetchOutcome::skipped(SkipReason::Gate(denied))),
        };
        let page_size = self.config.page_size;
        let request = FetchRequest::newer(chat, page_size, plan.cursor);
        let result = self.issue(FetchMode::NewerWard, &request).await;

        let mut state = self.state.lock();
        if let Some(stale) = stale(&state, session) {
            return Ok(stale);
        }
        let records = normalize(result?, chat);
        let inserted = self.absorb_locked(&mut state, &records, Placement::After(plan.cursor));
        if !plan.fills_gap && records.len() < page_size as usize {
            debug!(target: "window::fetch", %chat, cursor = plan.cursor, "reached live edge");
            state.has_reached_newest = true;
        }
        Ok(FetchOutcome::Loaded {
            mode: FetchMode::NewerWard,
            received: records.len(),
            inserted,
        })
    }

    /// Loads a page centred on `target`, replacing all prior coverage with it.
    ///
    /// Coverage and the view are only reset once the response is in hand, so
    /// a failed jump leaves the window as it was. The reset advances the
    /// session, which discards any scroll fetch still in flight from before.
    pub async fn load_around(&self, target: MessageId) -> Result<FetchOutcome, WindowError> {
        let (session, chat) = {
            let state = self.state.lock();
            let Some(chat) = state.chat else {
                return Ok(FetchOutcome::skipped(SkipReason::NoActiveChat));
            };
            (state.session, chat)
        };
        let _permit = match self.gate.try_acquire(FetchMode::AroundTarget) {
            Ok(permit) => permit,
            Err(denied) => return Ok(FetchOutcome::skipped(SkipReason::Gate(denied))),
        };
        let request = FetchRequest::around(chat, self.config.page_size, target);
        let result = self.issue(FetchMode::AroundTarget, &request).await;

        let mut state = self.state.lock();
        if let Some(stale) = stale(&state, session) {
            return Ok(stale);
        }
        let records = normalize(result?, chat);
        self.reset_locked(&mut state, Some(chat));
        let inserted = self.absorb_locked(&mut state, &records, Placement::Around(target));
        debug!(
            target: "window::fetch",
            %chat,
            target,
            received = records.len(),
            session = %state.session,
            "loaded around target"
        );
        Ok(FetchOutcome::Loaded {
            mode: FetchMode::AroundTarget,
            received: records.len(),
            inserted,
        })
    }

    /// Scroll-driven dispatch: near the top pages older history, near the
    /// bottom pages newer history below the last visible message.
    pub async fn on_scroll(&self, scroll: ScrollSnapshot) -> Result<FetchOutcome, WindowError> {
        let near = self.config.near_edge_px;
        let near_top = scroll.from_top <= near;
        let near_bottom = scroll.from_bottom <= near;
        if near_top {
            let outcome = self.load_older().await?;
            let exhausted = matches!(
                outcome,
                FetchOutcome::Skipped {
                    reason: SkipReason::ReachedOldest
                }
            );
            if !(exhausted && near_bottom) {
                return Ok(outcome);
            }
        }
        if near_bottom {
            return self.load_newer(scroll.last_visible).await;
        }
        trace!(target: "window::fetch", from_top = scroll.from_top, from_bottom = scroll.from_bottom, "scroll not near an edge");
        Ok(FetchOutcome::skipped(SkipReason::NotNearEdge))
    }

    async fn issue(
        &self,
        mode: FetchMode,
        request: &FetchRequest,
    ) -> Result<Vec<MessageRecord>, WindowError> {
        debug!(
            target: "window::fetch",
            %mode,
            chat = request.chat_id,
            cursor = ?request.cursor,
            page_size = request.page_size,
            "issuing fetch"
        );
        let fetch = self.source.fetch(request);
        let result = match self.config.fetch_timeout() {
            Some(limit) => match tokio::time::timeout(limit, fetch).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(target: "window::fetch", %mode, timeout = ?limit, "fetch timed out");
                    return Err(WindowError::TimedOut { mode, after: limit });
                }
            },
            None => fetch.await,
        };
        result.map_err(|source| {
            warn!(target: "window::fetch", %mode, error = %source, "fetch failed");
            WindowError::Source { mode, source }
        })
    }
}

fn stale(state: &WindowState, issued: SessionToken) -> Option<FetchOutcome> {
    if state.session == issued {
        return None;
    }
    trace!(
        target: "window::fetch",
        %issued,
        current = %state.session,
        "dropping response from a previous session"
    );
    Some(FetchOutcome::Stale {
        issued,
        current: state.session,
    })
}

fn plan_newer(state: &WindowState, anchor: Option<MessageId>) -> Option<NewerPlan> {
    let intervals = state.coverage.intervals();
    let last = intervals.len().checked_sub(1)?;
    let idx = anchor
        .and_then(|id| state.coverage.index_containing(id))
        .unwrap_or(last);
    let cursor = intervals[idx].newest_id;
    if idx < last {
        Some(NewerPlan {
            cursor,
            fills_gap: true,
        })
    } else if !state.has_reached_newest {
        Some(NewerPlan {
            cursor,
            fills_gap: false,
        })
    } else {
        None
    }
}
