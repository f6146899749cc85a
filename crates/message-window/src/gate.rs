//! Per-mode mutual exclusion for history fetches.
//!
//! Each fetch mode owns one in-flight flag. A second request in the same mode
//! is refused (not queued) while the first is outstanding; different modes may
//! overlap freely because coverage merges are order-independent. Release is
//! tied to [`FetchPermit`]'s `Drop`, so a fetch that errors or panics still
//! frees its mode.

use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchMode {
    Initial,
    OlderWard,
    NewerWard,
    AroundTarget,
}

impl FetchMode {
    pub const ALL: [FetchMode; 4] = [
        FetchMode::Initial,
        FetchMode::OlderWard,
        FetchMode::NewerWard,
        FetchMode::AroundTarget,
    ];

    /// Scroll-driven modes; these are held back while a jump is in progress.
    pub fn is_ambient(self) -> bool {
        matches!(self, FetchMode::OlderWard | FetchMode::NewerWard)
    }

    fn slot(self) -> usize {
        match self {
            FetchMode::Initial => 0,
            FetchMode::OlderWard => 1,
            FetchMode::NewerWard => 2,
            FetchMode::AroundTarget => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FetchMode::Initial => "initial",
            FetchMode::OlderWard => "older",
            FetchMode::NewerWard => "newer",
            FetchMode::AroundTarget => "around_target",
        }
    }
}

impl fmt::Display for FetchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "denied", content = "mode")]
pub enum GateDenied {
    #[error("{0} fetch already in flight")]
    InFlight(FetchMode),
    #[error("fetches paused for a bulk operation")]
    BulkOperation,
    #[error("scroll-driven fetches suppressed while jumping to a message")]
    AmbientSuppressed,
}

#[derive(Debug, Default)]
struct GateFlags {
    in_flight: [bool; 4],
    bulk_operations: u32,
    ambient_suppressions: u32,
    epoch: u64,
}

#[derive(Debug, Default)]
pub struct FetchGate {
    flags: Mutex<GateFlags>,
}

impl FetchGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self, mode: FetchMode) -> Result<FetchPermit<'_>, GateDenied> {
        let mut flags = self.flags.lock();
        let denied = if flags.bulk_operations > 0 {
            Some(GateDenied::BulkOperation)
        } else if mode.is_ambient() && flags.ambient_suppressions > 0 {
            Some(GateDenied::AmbientSuppressed)
        } else if flags.in_flight[mode.slot()] {
            Some(GateDenied::InFlight(mode))
        } else {
            None
        };
        if let Some(reason) = denied {
            trace!(target: "window::fetch", %mode, %reason, "fetch gate denied");
            return Err(reason);
        }
        flags.in_flight[mode.slot()] = true;
        Ok(FetchPermit {
            gate: self,
            mode,
            epoch: flags.epoch,
        })
    }

    pub fn is_in_flight(&self, mode: FetchMode) -> bool {
        self.flags.lock().in_flight[mode.slot()]
    }

    pub fn is_ambient_suppressed(&self) -> bool {
        self.flags.lock().ambient_suppressions > 0
    }

    pub fn is_bulk_operation_running(&self) -> bool {
        self.flags.lock().bulk_operations > 0
    }

    /// Refuses every fetch until the returned guard is dropped.
    pub fn begin_bulk_operation(&self) -> BulkGuard<'_> {
        self.flags.lock().bulk_operations += 1;
        BulkGuard { gate: self }
    }

    /// Refuses scroll-driven fetches until the returned guard is dropped.
    pub fn suppress_ambient(&self) -> AmbientGuard<'_> {
        self.flags.lock().ambient_suppressions += 1;
        AmbientGuard { gate: self }
    }

    /// Clears every in-flight flag and starts a new epoch. Permits handed out
    /// before the reset no longer touch the flags when dropped.
    pub fn reset(&self) {
        let mut flags = self.flags.lock();
        flags.in_flight = [false; 4];
        flags.epoch = flags.epoch.wrapping_add(1);
    }

    fn release(&self, mode: FetchMode, epoch: u64) {
        let mut flags = self.flags.lock();
        if flags.epoch == epoch {
            flags.in_flight[mode.slot()] = false;
        } else {
            trace!(target: "window::fetch", %mode, epoch, current = flags.epoch, "released permit from a previous epoch");
        }
    }
}

#[must_use = "dropping the permit releases the fetch mode immediately"]
#[derive(Debug)]
pub struct FetchPermit<'a> {
    gate: &'a FetchGate,
    mode: FetchMode,
    epoch: u64,
}

impl FetchPermit<'_> {
    pub fn mode(&self) -> FetchMode {
        self.mode
    }
}

impl Drop for FetchPermit<'_> {
    fn drop(&mut self) {
        self.gate.release(self.mode, self.epoch);
    }
}

#[must_use = "dropping the guard ends the bulk operation"]
#[derive(Debug)]
pub struct BulkGuard<'a> {
    gate: &'a FetchGate,
}

impl Drop for BulkGuard<'_> {
    fn drop(&mut self) {
        let mut flags = self.gate.flags.lock();
        flags.bulk_operations = flags.bulk_operations.saturating_sub(1);
    }
}

#[must_use = "dropping the guard re-enables scroll-driven fetches"]
#[derive(Debug)]
pub struct AmbientGuard<'a> {
    gate: &'a FetchGate,
}

impl Drop for AmbientGuard<'_> {
    fn drop(&mut self) {
        let mut flags = self.gate.flags.lock();
        flags.ambient_suppressions = flags.ambient_suppressions.saturating_sub(1);
    }
}
