//! Decision policies for the desktop companion.
//!
//! This crate turns a context snapshot (mode, time, user text, focus signals)
//! into a single recommended action. Two interchangeable strategies exist: a
//! heuristic rule engine and a generative strategy backed by an
//! Ollama-compatible endpoint. The registry picks one by name and the decision
//! service wraps the result with the permission gateway.

/// Service configuration loaded from YAML and environment.
pub mod config;
/// Error types shared across the crate.
pub mod error;
/// Post-decision permission checks.
pub mod gateway;
/// Generative policy backed by a remote text-generation endpoint.
pub mod generative;
/// Context and action value types.
pub mod model;
/// Policy name resolution.
pub mod registry;
/// Heuristic rule policy.
pub mod rule;
/// Decision service tying registry, policies and gateway together.
pub mod service;
/// Utility modules for feedback persistence.
pub mod utils;

pub use config::{load_config, GenerativeConfig, ServiceConfig};
pub use error::{ConfigError, FeedbackError, GenerateError};
pub use gateway::{GatewayReason, GatewayVerdict};
pub use generative::GenerativePolicy;
pub use model::{Action, ActionType, Context, Decision, Mode, RiskLevel};
pub use registry::{Policy, PolicyKind, PolicyRegistry};
pub use rule::{LocalClock, RulePolicy};
pub use service::{DecisionOutcome, DecisionService};
pub use utils::feedback_log::{FeedbackRecord, FeedbackSink};
