//! Scripted sessions against an in-memory chat store.
//!
//! A scenario declares the chats the store holds and a list of steps. Each
//! step drives one window operation and produces a [`StepReport`] carrying the
//! operation's outcome and the window's bookkeeping afterwards.

use message_window::memory::{InMemorySource, RecordingView, sample_record};
use message_window::{
    ChatKind, ChatTarget, ChatWindow, MessageId, ScrollSnapshot, SourceError, WindowConfig,
    WindowError, WindowSnapshot,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(thiserror::Error, Debug)]
pub enum ScenarioError {
    #[error("failed to read scenario {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse scenario: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("chat {chat} is declared more than once")]
    DuplicateChat { chat: u64 },
    #[error("chat {chat} has last_id {last_id} below first_id {first_id}")]
    EmptyRange {
        chat: u64,
        first_id: MessageId,
        last_id: MessageId,
    },
    #[error("step {step} refers to undeclared chat {chat}")]
    UnknownChat { step: usize, chat: u64 },
    #[error("failed to encode report for step {step}: {source}")]
    Report {
        step: usize,
        source: serde_json::Error,
    },
    #[error("failed to write report for step {step}: {source}")]
    Write {
        step: usize,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    #[serde(default)]
    pub name: Option<String>,
    /// Replaces the base window config when present.
    #[serde(default)]
    pub window: Option<WindowConfig>,
    #[serde(default)]
    pub latency_ms: u64,
    /// Number of `exists` checks a fresh row fails before it counts as rendered.
    #[serde(default)]
    pub render_lag: u32,
    #[serde(default, rename = "chat")]
    pub chats: Vec<ScenarioChat>,
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioChat {
    pub id: u64,
    pub kind: ChatKind,
    #[serde(default = "default_first_id")]
    pub first_id: MessageId,
    pub last_id: MessageId,
    /// IDs missing from the log, as deleted messages would be.
    #[serde(default)]
    pub hidden: Vec<MessageId>,
}

fn default_first_id() -> MessageId {
    1
}

impl ScenarioChat {
    pub fn target(&self) -> ChatTarget {
        ChatTarget::new(self.id, self.kind)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case", deny_unknown_fields)]
pub enum Step {
    Open {
        chat: u64,
    },
    Switch {
        chat: u64,
    },
    Close,
    Older,
    Newer {
        #[serde(default)]
        anchor: Option<MessageId>,
    },
    Scroll {
        from_top: f32,
        from_bottom: f32,
        #[serde(default)]
        last_visible: Option<MessageId>,
    },
    Jump {
        target: MessageId,
    },
    /// Appends the next message to the chat's log and pushes it to the window.
    Push {
        chat: u64,
    },
    /// Pushes a message with a chosen ID without touching the log.
    Deliver {
        chat: u64,
        id: MessageId,
    },
    /// The next fetch fails. `status` makes it a rejection, otherwise a
    /// transport error.
    FailNext {
        #[serde(default)]
        status: Option<u16>,
        reason: String,
    },
}

impl Step {
    pub fn action(&self) -> &'static str {
        match self {
            Step::Open { .. } => "open",
            Step::Switch { .. } => "switch",
            Step::Close => "close",
            Step::Older => "older",
            Step::Newer { .. } => "newer",
            Step::Scroll { .. } => "scroll",
            Step::Jump { .. } => "jump",
            Step::Push { .. } => "push",
            Step::Deliver { .. } => "deliver",
            Step::FailNext { .. } => "fail_next",
        }
    }
}

impl Scenario {
    pub fn from_toml_str(raw: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = toml::from_str(raw)?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn from_path(path: &Path) -> Result<Self, ScenarioError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ScenarioError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Checks chat declarations and that every step names a declared chat.
    pub fn validate(&self) -> Result<(), ScenarioError> {
        let mut seen = HashMap::new();
        for chat in &self.chats {
            if seen.insert(chat.id, chat.target()).is_some() {
                return Err(ScenarioError::DuplicateChat { chat: chat.id });
            }
            if chat.last_id.saturating_add(1) < chat.first_id {
                return Err(ScenarioError::EmptyRange {
                    chat: chat.id,
                    first_id: chat.first_id,
                    last_id: chat.last_id,
                });
            }
        }
        for (step, action) in self.steps.iter().enumerate() {
            if let Some(chat) = action.chat()
                && !seen.contains_key(&chat)
            {
                return Err(ScenarioError::UnknownChat { step, chat });
            }
        }
        Ok(())
    }
}

impl Step {
    fn chat(&self) -> Option<u64> {
        match self {
            Step::Open { chat }
            | Step::Switch { chat }
            | Step::Push { chat }
            | Step::Deliver { chat, .. } => Some(*chat),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step: usize,
    pub action: &'static str,
    pub result: Value,
    pub rendered: usize,
    pub window: WindowSnapshot,
}

/// Owns the window under test together with its in-memory collaborators.
pub struct Runner {
    source: Arc<InMemorySource>,
    view: Arc<RecordingView>,
    window: ChatWindow,
    chats: HashMap<u64, ChatTarget>,
}

impl Runner {
    pub fn new(scenario: &Scenario, config: WindowConfig) -> Self {
        let source = InMemorySource::new().with_latency(Duration::from_millis(scenario.latency_ms));
        let mut chats = HashMap::new();
        for declared in &scenario.chats {
            let chat = declared.target();
            source.add_chat(chat, declared.first_id..=declared.last_id);
            for id in &declared.hidden {
                source.hide(chat, *id);
            }
            chats.insert(declared.id, chat);
        }
        let source = Arc::new(source);
        let view = Arc::new(RecordingView::with_render_lag(scenario.render_lag));
        let window = ChatWindow::with_config(source.clone(), view.clone(), config);
        Self {
            source,
            view,
            window,
            chats,
        }
    }

    pub fn window(&self) -> &ChatWindow {
        &self.window
    }

    pub async fn step(&self, index: usize, step: &Step) -> Result<StepReport, ScenarioError> {
        debug!(target: "window_sim", step = index, action = step.action(), "running step");
        let encode = |source| ScenarioError::Report {
            step: index,
            source,
        };
        let result = match step {
            Step::Open { chat } => outcome(self.window.open_chat(self.chat(index, *chat)?).await),
            Step::Switch { chat } => {
                let session = self.window.switch_chat(self.chat(index, *chat)?);
                Ok(json!({ "session": session }))
            }
            Step::Close => Ok(json!({ "session": self.window.close() })),
            Step::Older => outcome(self.window.load_older().await),
            Step::Newer { anchor } => outcome(self.window.load_newer(*anchor).await),
            Step::Scroll {
                from_top,
                from_bottom,
                last_visible,
            } => outcome(
                self.window
                    .on_scroll(ScrollSnapshot {
                        from_top: *from_top,
                        from_bottom: *from_bottom,
                        last_visible: *last_visible,
                    })
                    .await,
            ),
            Step::Jump { target } => outcome(self.window.jump_to(*target).await),
            Step::Push { chat } => {
                let chat = self.chat(index, *chat)?;
                match self.source.post(chat) {
                    Some(record) => {
                        let id = record.id;
                        serde_json::to_value(self.window.on_new_message(record))
                            .map(|live| json!({ "id": id, "live": live }))
                    }
                    None => Ok(json!({ "error": "chat has no log" })),
                }
            }
            Step::Deliver { chat, id } => {
                let record = sample_record(self.chat(index, *chat)?, *id);
                serde_json::to_value(self.window.on_new_message(record))
                    .map(|live| json!({ "id": id, "live": live }))
            }
            Step::FailNext { status, reason } => {
                let error = match status {
                    Some(status) => SourceError::Rejected {
                        status: *status,
                        reason: reason.clone(),
                    },
                    None => SourceError::Transport(reason.clone()),
                };
                self.source.fail_next(error);
                Ok(json!({ "scheduled": true }))
            }
        }
        .map_err(encode)?;

        Ok(StepReport {
            step: index,
            action: step.action(),
            result,
            rendered: self.view.ids().len(),
            window: self.window.snapshot(),
        })
    }

    fn chat(&self, step: usize, chat: u64) -> Result<ChatTarget, ScenarioError> {
        self.chats
            .get(&chat)
            .copied()
            .ok_or(ScenarioError::UnknownChat { step, chat })
    }
}

fn outcome<T: Serialize>(result: Result<T, WindowError>) -> Result<Value, serde_json::Error> {
    match result {
        Ok(outcome) => serde_json::to_value(outcome),
        Err(err) => Ok(json!({
            "error": err.to_string(),
            "retryable": err.is_retryable(),
        })),
    }
}

/// Writes `report` as one JSON document followed by a newline and flushes.
pub fn write_report<W: Write>(
    out: &mut W,
    report: &StepReport,
    pretty: bool,
) -> Result<(), ScenarioError> {
    let encoded = if pretty {
        serde_json::to_string_pretty(report)
    } else {
        serde_json::to_string(report)
    }
    .map_err(|source| ScenarioError::Report {
        step: report.step,
        source,
    })?;
    writeln!(out, "{encoded}")
        .and_then(|()| out.flush())
        .map_err(|source| ScenarioError::Write {
            step: report.step,
            source,
        })
}

/// Runs every step in order, handing each report to `emit` as it completes.
/// The first error from `emit` stops the run.
pub async fn run<F>(
    scenario: &Scenario,
    config: WindowConfig,
    mut emit: F,
) -> Result<usize, ScenarioError>
where
    F: FnMut(&StepReport) -> Result<(), ScenarioError>,
{
    let runner = Runner::new(scenario, config);
    info!(
        target: "window_sim",
        name = scenario.name.as_deref().unwrap_or("unnamed"),
        steps = scenario.steps.len(),
        "running scenario"
    );
    for (index, step) in scenario.steps.iter().enumerate() {
        let report = runner.step(index, step).await?;
        emit(&report)?;
    }
    Ok(scenario.steps.len())
}
