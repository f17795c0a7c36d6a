use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::config::ServiceConfig;
use crate::gateway::{self, GatewayReason};
use crate::model::{Context, Decision};
use crate::registry::{Policy, PolicyKind, PolicyRegistry};

/// A gateway-reviewed decision plus how long it took.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionOutcome {
    pub decision: Decision,
    pub latency_ms: u64,
    pub gateway_blocked: bool,
    pub advisories: Vec<GatewayReason>,
}

/// Resolves the configured policy once per request and reviews its output.
#[derive(Debug, Clone)]
pub struct DecisionService {
    registry: PolicyRegistry,
    policy_name: Option<String>,
}

impl DecisionService {
    pub fn new(registry: PolicyRegistry, policy_name: Option<String>) -> Self {
        Self {
            registry,
            policy_name,
        }
    }

    pub fn from_config(cfg: &ServiceConfig) -> Self {
        Self::new(PolicyRegistry::from_config(cfg), cfg.policy.clone())
    }

    pub fn policy_name(&self) -> Option<&str> {
        self.policy_name.as_deref()
    }

    pub fn active_policy(&self) -> &Policy {
        self.registry.lookup(self.policy_name())
    }

    /// Upper bound of the remote call, if the active policy makes one.
    pub fn generate_timeout(&self) -> Option<Duration> {
        match self.active_policy() {
            Policy::Generative(generative) => Some(generative.timeout()),
            Policy::Rule(_) | Policy::Unavailable => None,
        }
    }

    pub async fn decide(&self, ctx: &Context) -> DecisionOutcome {
        let started = Instant::now();
        let policy = self.active_policy();
        if policy.kind() == PolicyKind::Unavailable {
            warn!(policy = ?self.policy_name, "configured policy is not available");
        }

        let decision = policy.decide(ctx).await;
        let verdict = gateway::review(ctx, decision);
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let advisories: Vec<&str> = verdict.reasons.iter().map(|r| r.as_str()).collect();

        info!(
            policy = policy.kind().as_str(),
            policy_version = %verdict.decision.policy_version,
            model_id = %verdict.decision.model_id,
            action = verdict.decision.action.action_type.as_str(),
            blocked = verdict.blocked,
            advisories = ?advisories,
            latency_ms,
            "decision made"
        );

        DecisionOutcome {
            decision: verdict.decision,
            latency_ms,
            gateway_blocked: verdict.blocked,
            advisories: verdict.reasons,
        }
    }
}
