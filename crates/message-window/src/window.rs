//! The per-chat window: coverage, terminal flags and the collaborators the
//! fetch modes talk to.
//!
//! All state lives behind one lock that is never held across an `.await`, so
//! everything between two suspension points (a fetch, a poll sleep) is applied
//! atomically with respect to every other window operation.

use crate::config::WindowConfig;
use crate::coverage::CoverageSet;
use crate::gaps::{self, GapMarker};
use crate::gate::{BulkGuard, FetchGate};
use crate::model::{ChatTarget, MessageId, MessageRecord, SessionToken};
use crate::source::MessageSource;
use crate::view::{Placement, ViewSink};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// A jump that is waiting for its target to materialize in the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PendingTarget {
    pub target_id: MessageId,
    pub attempts_remaining: u32,
}

#[derive(Debug, Default)]
pub(crate) struct WindowState {
    pub(crate) session: SessionToken,
    pub(crate) chat: Option<ChatTarget>,
    pub(crate) coverage: CoverageSet,
    pub(crate) gaps: Vec<GapMarker>,
    pub(crate) has_reached_oldest: bool,
    pub(crate) has_reached_newest: bool,
    pub(crate) pending_target: Option<PendingTarget>,
}

/// Serializable view of the window's bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowSnapshot {
    pub session: SessionToken,
    pub chat: Option<ChatTarget>,
    pub coverage: CoverageSet,
    pub gaps: Vec<GapMarker>,
    pub has_reached_oldest: bool,
    pub has_reached_newest: bool,
    pub pending_target: Option<PendingTarget>,
}

pub struct ChatWindow {
    pub(crate) source: Arc<dyn MessageSource>,
    pub(crate) view: Arc<dyn ViewSink>,
    pub(crate) config: WindowConfig,
    pub(crate) gate: FetchGate,
    pub(crate) state: Mutex<WindowState>,
}

impl ChatWindow {
    pub fn new(source: Arc<dyn MessageSource>, view: Arc<dyn ViewSink>) -> Self {
        Self::with_config(source, view, WindowConfig::default())
    }

    pub fn with_config(
        source: Arc<dyn MessageSource>,
        view: Arc<dyn ViewSink>,
        config: WindowConfig,
    ) -> Self {
        Self {
            source,
            view,
            config,
            gate: FetchGate::new(),
            state: Mutex::new(WindowState::default()),
        }
    }

    pub fn config(&self) -> &WindowConfig {
        &self.config
    }

    pub fn gate(&self) -> &FetchGate {
        &self.gate
    }

    pub fn session(&self) -> SessionToken {
        self.state.lock().session
    }

    pub fn active_chat(&self) -> Option<ChatTarget> {
        self.state.lock().chat
    }

    pub fn coverage(&self) -> CoverageSet {
        self.state.lock().coverage.clone()
    }

    pub fn gap_markers(&self) -> Vec<GapMarker> {
        self.state.lock().gaps.clone()
    }

    pub fn has_reached_oldest(&self) -> bool {
        self.state.lock().has_reached_oldest
    }

    pub fn has_reached_newest(&self) -> bool {
        self.state.lock().has_reached_newest
    }

    pub fn pending_target(&self) -> Option<PendingTarget> {
        self.state.lock().pending_target
    }

    pub fn snapshot(&self) -> WindowSnapshot {
        let state = self.state.lock();
        WindowSnapshot {
            session: state.session,
            chat: state.chat,
            coverage: state.coverage.clone(),
            gaps: state.gaps.clone(),
            has_reached_oldest: state.has_reached_oldest,
            has_reached_newest: state.has_reached_newest,
            pending_target: state.pending_target,
        }
    }

    /// Pauses all history fetching (e.g. while marking everything read).
    pub fn begin_bulk_operation(&self) -> BulkGuard<'_> {
        self.gate.begin_bulk_operation()
    }

    /// Makes `chat` the active chat without fetching anything. Late results
    /// for the previous chat are dropped from here on.
    pub fn switch_chat(&self, chat: ChatTarget) -> SessionToken {
        let mut state = self.state.lock();
        self.gate.reset();
        self.reset_locked(&mut state, Some(chat))
    }

    /// Detaches the window from any chat.
    pub fn close(&self) -> SessionToken {
        let mut state = self.state.lock();
        self.gate.reset();
        self.reset_locked(&mut state, None)
    }

    /// Wipes coverage and the view and advances the session token.
    pub(crate) fn reset_locked(
        &self,
        state: &mut WindowState,
        chat: Option<ChatTarget>,
    ) -> SessionToken {
        let previous = state.session;
        state.session = previous.next();
        state.chat = chat;
        state.coverage.clear();
        state.gaps.clear();
        state.has_reached_oldest = false;
        state.has_reached_newest = false;
        state.pending_target = None;
        self.view.clear();
        debug!(
            target: "window::fetch",
            %previous,
            session = %state.session,
            chat = ?chat.map(|c| c.to_string()),
            "window reset"
        );
        state.session
    }

    /// Inserts the not-yet-covered part of `records` into the view, merges the
    /// whole batch into coverage and rebuilds gap markers. Returns how many
    /// records were inserted.
    ///
    /// `records` must be sorted ascending. Fresh records are inserted as runs
    /// split at every covered ID, each run placed directly after the newest
    /// covered message below it, so the view stays in ID order. `empty` is the
    /// placement used when nothing was covered yet.
    pub(crate) fn absorb_locked(
        &self,
        state: &mut WindowState,
        records: &[MessageRecord],
        empty: Placement,
    ) -> usize {
        let was_empty = state.coverage.is_empty();
        let mut runs: Vec<(Option<MessageId>, Vec<MessageRecord>)> = Vec::new();
        for record in records.iter().filter(|record| !state.coverage.contains(record.id)) {
            let anchor = state.coverage.covered_before(record.id);
            match runs.last_mut() {
                Some((run_anchor, run)) if *run_anchor == anchor => run.push(record.clone()),
                _ => runs.push((anchor, vec![record.clone()])),
            }
        }

        if let Some(outcome) = state.coverage.merge(records.iter().map(|record| record.id)) {
            let span = records.last().map_or(0, |last| last.id - records[0].id + 1);
            if span > records.len() as u64 {
                warn!(
                    target: "window::coverage",
                    oldest = records[0].id,
                    newest = records[records.len() - 1].id,
                    received = records.len(),
                    "batch is not contiguous; covering the full span"
                );
            }
            debug!(
                target: "window::coverage",
                oldest = outcome.interval.oldest_id,
                newest = outcome.interval.newest_id,
                absorbed = outcome.absorbed,
                intervals = state.coverage.len(),
                runs = runs.len(),
                "coverage updated"
            );
        }

        let mut inserted = 0;
        for (anchor, run) in &runs {
            let placement = match anchor {
                Some(previous) => Placement::After(*previous),
                None if was_empty => empty,
                None => Placement::Prepend,
            };
            self.view.insert(run, placement);
            inserted += run.len();
        }
        state.gaps = gaps::refresh(&state.coverage, self.view.as_ref());
        inserted
    }
}

/// Sorts a response ascending, drops duplicate IDs and anything that does not
/// belong to `chat`.
pub(crate) fn normalize(mut records: Vec<MessageRecord>, chat: ChatTarget) -> Vec<MessageRecord> {
    let before = records.len();
    records.retain(|record| record.chat == chat);
    if records.len() != before {
        warn!(
            target: "window::fetch",
            %chat,
            dropped = before - records.len(),
            "response contained records from another chat"
        );
    }
    records.sort_by_key(|record| record.id);
    records.dedup_by_key(|record| record.id);
    records
}
