use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Admission scope, from coarsest to finest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RateScope {
    /// Whole process.
    Global,
    /// One tenant.
    Tenant(String),
    /// One agent within a tenant.
    Agent {
        /// Tenant id.
        tenant: String,
        /// Agent id.
        agent: String,
    },
    /// One source address.
    Source(String),
}

impl RateScope {
    /// Canonical bucket key.
    pub fn key(&self) -> String {
        match self {
            RateScope::Global => "global".to_string(),
            RateScope::Tenant(t) => format!("tenant:{}", t),
            RateScope::Agent { tenant, agent } => format!("agent:{}:{}", tenant, agent),
            RateScope::Source(addr) => format!("source:{}", addr),
        }
    }

    /// Scope kind name, used as `limit_type` in decisions.
    pub fn kind(&self) -> &'static str {
        match self {
            RateScope::Global => "global",
            RateScope::Tenant(_) => "tenant",
            RateScope::Agent { .. } => "agent",
            RateScope::Source(_) => "source",
        }
    }
}

/// What to do when a bucket is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitAction {
    /// Count but never deny (monitor mode).
    Allow,
    /// Deny with a retry hint.
    Throttle,
    /// Deny outright.
    Block,
}

impl LimitAction {
    /// Severity order for picking the most restrictive decision.
    pub fn severity(&self) -> u8 {
        match self {
            LimitAction::Allow => 0,
            LimitAction::Throttle => 1,
            LimitAction::Block => 2,
        }
    }
}

/// A fixed-window budget for one scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateRule {
    /// Requests admitted per window.
    pub max_requests: u32,
    /// Window length.
    pub window: Duration,
    /// Behavior at exhaustion.
    pub action: LimitAction,
}

impl RateRule {
    /// Creates a throttling rule.
    pub fn throttle(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            action: LimitAction::Throttle,
        }
    }

    /// Creates a blocking rule.
    pub fn block(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            action: LimitAction::Block,
        }
    }
}

/// The outcome of an admission check, taken from the most restrictive of
/// the applicable scopes.
#[derive(Debug, Clone, Serialize)]
pub struct Decision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// The governing rule's action.
    pub action: LimitAction,
    /// When the governing window resets.
    pub reset_at: DateTime<Utc>,
    /// Requests left in the governing window.
    pub remaining: u32,
    /// The governing limit.
    pub limit: u32,
    /// Scope kind of the governing rule.
    pub limit_type: &'static str,
}

/// A recorded denial.
#[derive(Debug, Clone)]
pub struct Violation {
    /// Bucket key that denied.
    pub scope: String,
    /// When the denial happened.
    pub at: DateTime<Utc>,
}
