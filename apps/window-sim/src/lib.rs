//! Replays scripted chat sessions against a [`message_window::ChatWindow`]
//! backed by in-memory collaborators.

pub mod logging;
pub mod scenario;

pub use scenario::{Runner, Scenario, ScenarioError, Step, StepReport};
