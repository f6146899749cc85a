//! Client-side bookkeeping for a partially loaded window over an append-only
//! chat log.
//!
//! A [`ChatWindow`] tracks which runs of message IDs are rendered
//! ([`CoverageSet`]), marks the holes between them ([`GapMarker`]), pages
//! history in four modes without overlapping requests ([`FetchGate`]), jumps to
//! arbitrary messages and folds real-time pushes into the same coverage.
//! Storage, rendering and the push transport stay outside, behind
//! [`MessageSource`] and [`ViewSink`].

pub mod config;
pub mod coverage;
pub mod error;
pub mod gaps;
pub mod gate;
pub mod live;
pub mod loader;
pub mod locator;
pub mod memory;
pub mod model;
pub mod source;
pub mod view;
pub mod window;

pub use config::{ConfigError, WindowConfig};
pub use coverage::{CoverageError, CoverageSet, Interval, MergeOutcome};
pub use error::WindowError;
pub use gaps::GapMarker;
pub use gate::{FetchGate, FetchMode, FetchPermit, GateDenied};
pub use live::LiveOutcome;
pub use loader::{FetchOutcome, ScrollSnapshot, SkipReason};
pub use locator::JumpOutcome;
pub use model::{Attachment, ChatKind, ChatTarget, MessageId, MessageRecord, SessionToken};
pub use source::{FetchRequest, MessageSource, PageDirection, SourceError};
pub use view::{Placement, ViewHandle, ViewSink};
pub use window::{ChatWindow, PendingTarget, WindowSnapshot};
