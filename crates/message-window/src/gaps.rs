//! Gap markers derived from coverage.
//!
//! Markers are rebuilt from scratch on every coverage change.

use crate::coverage::CoverageSet;
use crate::model::MessageId;
use crate::view::{ViewHandle, ViewSink};
use serde::{Deserialize, Serialize};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapMarker {
    /// Newest covered ID before the gap; the marker is drawn under this row.
    pub after_id: MessageId,
    /// Oldest covered ID after the gap.
    pub before_id: MessageId,
    /// View position of `after_id`, when the view has rendered it.
    pub anchor: Option<ViewHandle>,
}

impl GapMarker {
    /// Upper bound on how many messages the gap hides.
    pub fn missing(&self) -> u64 {
        self.before_id - self.after_id - 1
    }
}

/// One marker per gap between consecutive intervals, with no view anchor.
pub fn recompute(coverage: &CoverageSet) -> Vec<GapMarker> {
    coverage
        .gaps()
        .filter(|(after, before)| after + 1 != *before)
        .map(|(after_id, before_id)| GapMarker {
            after_id,
            before_id,
            anchor: None,
        })
        .collect()
}

/// Recomputes markers, anchors them in `view` and hands the full set over,
/// discarding whatever markers the view showed before.
pub fn refresh(coverage: &CoverageSet, view: &dyn ViewSink) -> Vec<GapMarker> {
    let markers: Vec<GapMarker> = recompute(coverage)
        .into_iter()
        .map(|marker| GapMarker {
            anchor: view.position_of(marker.after_id),
            ..marker
        })
        .collect();
    trace!(target: "window::coverage", markers = markers.len(), "refreshed gap markers");
    view.replace_gap_markers(&markers);
    markers
}
