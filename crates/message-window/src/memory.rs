//! In-memory collaborators for tests, demos and early wiring.

use crate::gaps::GapMarker;
use crate::model::{ChatTarget, MessageId, MessageRecord};
use crate::source::{FetchRequest, MessageSource, PageDirection, SourceError};
use crate::view::{Placement, ViewHandle, ViewSink};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::ops::RangeInclusive;
use std::time::Duration;
use time::OffsetDateTime;
use time::macros::datetime;

const SENDERS: [&str; 4] = ["ada", "brook", "cyd", "dee"];
const LOG_EPOCH: OffsetDateTime = datetime!(2024-01-01 00:00:00 UTC);

/// Deterministic record for message `id` of `chat`.
pub fn sample_record(chat: ChatTarget, id: MessageId) -> MessageRecord {
    MessageRecord {
        id,
        chat,
        sent_at: LOG_EPOCH + time::Duration::seconds(id as i64),
        sender: SENDERS[(id % SENDERS.len() as u64) as usize].to_string(),
        body: format!("message {id}"),
        attachments: Vec::new(),
    }
}

#[derive(Debug)]
struct ChatLog {
    chat: ChatTarget,
    first_id: MessageId,
    /// One past the newest message.
    next_id: MessageId,
    hidden: BTreeSet<MessageId>,
}

impl ChatLog {
    fn page(&self, request: &FetchRequest) -> Vec<MessageRecord> {
        if self.next_id <= self.first_id {
            return Vec::new();
        }
        let first = self.first_id;
        let last = self.next_id - 1;
        let page = u64::from(request.page_size);
        let bounds = match (request.cursor, request.direction, request.both_directions) {
            (Some(cursor), _, true) => {
                let before = page / 2;
                let after = page.saturating_sub(1).saturating_sub(before);
                Some((
                    cursor.saturating_sub(before).max(first),
                    cursor.saturating_add(after).min(last),
                ))
            }
            (Some(cursor), PageDirection::Older, false) => (cursor > first)
                .then(|| (cursor.saturating_sub(page).max(first), cursor - 1)),
            (Some(cursor), PageDirection::Newer, false) => (cursor < last)
                .then(|| (cursor + 1, cursor.saturating_add(page).min(last))),
            _ => Some((last.saturating_sub(page.saturating_sub(1)).max(first), last)),
        };
        let Some((lo, hi)) = bounds.filter(|(lo, hi)| lo <= hi && page > 0) else {
            return Vec::new();
        };
        (lo..=hi)
            .filter(|id| !self.hidden.contains(id))
            .map(|id| sample_record(self.chat, id))
            .collect()
    }
}

/// Dense message logs keyed by chat, with scripted failures and latency.
#[derive(Debug, Default)]
pub struct InMemorySource {
    logs: Mutex<HashMap<u64, ChatLog>>,
    failures: Mutex<VecDeque<SourceError>>,
    requests: Mutex<Vec<FetchRequest>>,
    latency: Duration,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chat(self, chat: ChatTarget, ids: RangeInclusive<MessageId>) -> Self {
        self.add_chat(chat, ids);
        self
    }

    /// Every fetch sleeps this long before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn add_chat(&self, chat: ChatTarget, ids: RangeInclusive<MessageId>) {
        let (first_id, last_id) = ids.into_inner();
        self.logs.lock().insert(
            chat.id,
            ChatLog {
                chat,
                first_id,
                next_id: last_id.saturating_add(1).max(first_id),
                hidden: BTreeSet::new(),
            },
        );
    }

    /// Appends a new message to the chat's log and returns it, as the push
    /// channel would deliver it.
    pub fn post(&self, chat: ChatTarget) -> Option<MessageRecord> {
        let mut logs = self.logs.lock();
        let log = logs.get_mut(&chat.id)?;
        let id = log.next_id;
        log.next_id += 1;
        Some(sample_record(log.chat, id))
    }

    /// Leaves a hole in the log, as a deleted message would.
    pub fn hide(&self, chat: ChatTarget, id: MessageId) {
        if let Some(log) = self.logs.lock().get_mut(&chat.id) {
            log.hidden.insert(id);
        }
    }

    /// The next fetch (of any kind) fails with `error`.
    pub fn fail_next(&self, error: SourceError) {
        self.failures.lock().push_back(error);
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl MessageSource for InMemorySource {
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<MessageRecord>, SourceError> {
        self.requests.lock().push(request.clone());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if let Some(error) = self.failures.lock().pop_front() {
            return Err(error);
        }
        let logs = self.logs.lock();
        let log = logs.get(&request.chat_id).ok_or_else(|| SourceError::Rejected {
            status: 404,
            reason: format!("unknown chat {}", request.chat_id),
        })?;
        Ok(log.page(request))
    }
}

#[derive(Debug)]
struct Row {
    id: MessageId,
    handle: ViewHandle,
    /// `exists` checks left before the row counts as rendered.
    unrendered_checks: u32,
}

#[derive(Debug, Default)]
struct ViewModel {
    rows: Vec<Row>,
    markers: Vec<GapMarker>,
    focused: Vec<MessageId>,
    placements: Vec<Placement>,
    clears: usize,
    next_handle: u64,
}

/// Ordered list of rendered rows that records everything done to it.
///
/// With a render lag of `n`, a freshly inserted row answers `false` to its
/// first `n` `exists` checks, like a view whose layout pass trails insertion.
#[derive(Debug, Default)]
pub struct RecordingView {
    model: Mutex<ViewModel>,
    render_lag: u32,
}

impl RecordingView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_render_lag(render_lag: u32) -> Self {
        Self {
            render_lag,
            ..Self::default()
        }
    }

    pub fn records(chat: ChatTarget, ids: impl IntoIterator<Item = MessageId>) -> Vec<MessageRecord> {
        ids.into_iter().map(|id| sample_record(chat, id)).collect()
    }

    /// Row IDs from top to bottom.
    pub fn ids(&self) -> Vec<MessageId> {
        self.model.lock().rows.iter().map(|row| row.id).collect()
    }

    pub fn gap_markers(&self) -> Vec<GapMarker> {
        self.model.lock().markers.clone()
    }

    pub fn focused(&self) -> Vec<MessageId> {
        self.model.lock().focused.clone()
    }

    pub fn placements(&self) -> Vec<Placement> {
        self.model.lock().placements.clone()
    }

    pub fn clear_count(&self) -> usize {
        self.model.lock().clears
    }
}

impl ViewSink for RecordingView {
    fn insert(&self, batch: &[MessageRecord], placement: Placement) {
        let Some(first) = batch.first() else {
            return;
        };
        let mut model = self.model.lock();
        let at = match placement {
            Placement::Prepend => 0,
            Placement::Append => model.rows.len(),
            Placement::After(anchor) => model
                .rows
                .iter()
                .position(|row| row.id == anchor)
                .map_or(model.rows.len(), |idx| idx + 1),
            Placement::Around(_) => model.rows.partition_point(|row| row.id < first.id),
        };
        let start = model.next_handle;
        model.next_handle += batch.len() as u64;
        let rows: Vec<Row> = batch
            .iter()
            .zip(start..)
            .map(|(record, handle)| Row {
                id: record.id,
                handle: ViewHandle(handle),
                unrendered_checks: self.render_lag,
            })
            .collect();
        model.rows.splice(at..at, rows);
        model.placements.push(placement);
    }

    fn exists(&self, id: MessageId) -> bool {
        let mut model = self.model.lock();
        match model.rows.iter_mut().find(|row| row.id == id) {
            Some(row) if row.unrendered_checks > 0 => {
                row.unrendered_checks -= 1;
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    fn position_of(&self, id: MessageId) -> Option<ViewHandle> {
        self.model
            .lock()
            .rows
            .iter()
            .find(|row| row.id == id && row.unrendered_checks == 0)
            .map(|row| row.handle)
    }

    fn clear(&self) {
        let mut model = self.model.lock();
        model.rows.clear();
        model.markers.clear();
        model.clears += 1;
    }

    fn replace_gap_markers(&self, markers: &[GapMarker]) {
        self.model.lock().markers = markers.to_vec();
    }

    fn focus(&self, id: MessageId) {
        self.model.lock().focused.push(id);
    }
}
