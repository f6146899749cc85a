//! Bookkeeping for which contiguous runs of the message log are materialized
//! in the view.
//!
//! A [`CoverageSet`] holds sorted, pairwise non-touching [`Interval`]s: for
//! consecutive intervals `a` and `b`, `a.newest_id + 1 < b.oldest_id`. Any run
//! that overlaps or abuts existing coverage is folded into it on merge, so the
//! only way two intervals coexist is when a real gap separates them.

use crate::model::MessageId;
use serde::{Deserialize, Serialize};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interval {
    pub oldest_id: MessageId,
    pub newest_id: MessageId,
}

impl Interval {
    pub fn new(oldest_id: MessageId, newest_id: MessageId) -> Result<Self, CoverageError> {
        if oldest_id > newest_id {
            return Err(CoverageError::Inverted {
                oldest_id,
                newest_id,
            });
        }
        Ok(Self {
            oldest_id,
            newest_id,
        })
    }

    pub fn single(id: MessageId) -> Self {
        Self {
            oldest_id: id,
            newest_id: id,
        }
    }

    pub fn contains(&self, id: MessageId) -> bool {
        self.oldest_id <= id && id <= self.newest_id
    }

    /// Number of IDs in the run.
    pub fn span(&self) -> u64 {
        self.newest_id - self.oldest_id + 1
    }

    /// True when the run `[oldest, newest]` overlaps this interval or sits
    /// directly next to it.
    fn touches(&self, oldest: MessageId, newest: MessageId) -> bool {
        self.oldest_id <= newest.saturating_add(1) && self.newest_id.saturating_add(1) >= oldest
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CoverageError {
    #[error("interval is inverted: oldest {oldest_id} > newest {newest_id}")]
    Inverted {
        oldest_id: MessageId,
        newest_id: MessageId,
    },
    #[error("interval ending at {previous_newest} is not separated by a gap from one starting at {next_oldest}")]
    Unordered {
        previous_newest: MessageId,
        next_oldest: MessageId,
    },
}

/// Result of folding one batch into the coverage set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOutcome {
    /// The interval that now holds the batch.
    pub interval: Interval,
    /// How many pre-existing intervals were folded into `interval`.
    pub absorbed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Interval>", into = "Vec<Interval>")]
pub struct CoverageSet {
    intervals: Vec<Interval>,
}

impl CoverageSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds the IDs of a single fetch response into the set.
    ///
    /// The batch is taken to be one contiguous run spanning its smallest and
    /// largest ID. Duplicates are harmless; an empty batch is a no-op and
    /// returns `None`.
    pub fn merge<I>(&mut self, ids: I) -> Option<MergeOutcome>
    where
        I: IntoIterator<Item = MessageId>,
    {
        let mut ids = ids.into_iter();
        let first = ids.next()?;
        let (oldest, newest) = ids.fold((first, first), |(lo, hi), id| (lo.min(id), hi.max(id)));
        Some(self.merge_run(oldest, newest))
    }

    pub fn merge_one(&mut self, id: MessageId) -> MergeOutcome {
        self.merge_run(id, id)
    }

    fn merge_run(&mut self, oldest: MessageId, newest: MessageId) -> MergeOutcome {
        let mut merged = Interval {
            oldest_id: oldest,
            newest_id: newest,
        };
        let mut absorbed = 0usize;
        self.intervals.retain(|existing| {
            if existing.touches(oldest, newest) {
                merged.oldest_id = merged.oldest_id.min(existing.oldest_id);
                merged.newest_id = merged.newest_id.max(existing.newest_id);
                absorbed += 1;
                false
            } else {
                true
            }
        });
        let slot = self
            .intervals
            .partition_point(|existing| existing.oldest_id < merged.oldest_id);
        self.intervals.insert(slot, merged);
        trace!(
            target: "window::coverage",
            oldest,
            newest,
            merged_oldest = merged.oldest_id,
            merged_newest = merged.newest_id,
            absorbed,
            intervals = self.intervals.len(),
            "merged run"
        );
        MergeOutcome {
            interval: merged,
            absorbed,
        }
    }

    pub fn clear(&mut self) {
        self.intervals.clear();
    }

    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Globally oldest covered ID; the default cursor for older-ward loads.
    pub fn oldest_id(&self) -> Option<MessageId> {
        self.intervals.first().map(|interval| interval.oldest_id)
    }

    pub fn newest_id(&self) -> Option<MessageId> {
        self.intervals.last().map(|interval| interval.newest_id)
    }

    pub fn oldest_interval(&self) -> Option<&Interval> {
        self.intervals.first()
    }

    pub fn newest_interval(&self) -> Option<&Interval> {
        self.intervals.last()
    }

    pub fn contains(&self, id: MessageId) -> bool {
        self.index_containing(id).is_some()
    }

    pub fn interval_containing(&self, id: MessageId) -> Option<&Interval> {
        self.index_containing(id).map(|idx| &self.intervals[idx])
    }

    pub fn index_containing(&self, id: MessageId) -> Option<usize> {
        let idx = self
            .intervals
            .partition_point(|interval| interval.newest_id < id);
        self.intervals
            .get(idx)
            .filter(|interval| interval.contains(id))
            .map(|_| idx)
    }

    /// Newest covered ID strictly below `id`.
    pub fn covered_before(&self, id: MessageId) -> Option<MessageId> {
        let idx = self
            .intervals
            .partition_point(|interval| interval.oldest_id < id);
        let interval = self.intervals.get(idx.checked_sub(1)?)?;
        Some(interval.newest_id.min(id - 1))
    }

    /// `(after, before)` pairs for every uncovered span between intervals.
    pub fn gaps(&self) -> impl Iterator<Item = (MessageId, MessageId)> + '_ {
        self.intervals
            .windows(2)
            .map(|pair| (pair[0].newest_id, pair[1].oldest_id))
    }

    pub fn covered_count(&self) -> u64 {
        self.intervals.iter().map(Interval::span).sum()
    }
}

impl TryFrom<Vec<Interval>> for CoverageSet {
    type Error = CoverageError;

    fn try_from(intervals: Vec<Interval>) -> Result<Self, Self::Error> {
        for interval in &intervals {
            Interval::new(interval.oldest_id, interval.newest_id)?;
        }
        for pair in intervals.windows(2) {
            if pair[0].newest_id.saturating_add(1) >= pair[1].oldest_id {
                return Err(CoverageError::Unordered {
                    previous_newest: pair[0].newest_id,
                    next_oldest: pair[1].oldest_id,
                });
            }
        }
        Ok(Self { intervals })
    }
}

impl From<CoverageSet> for Vec<Interval> {
    fn from(set: CoverageSet) -> Self {
        set.intervals
    }
}
