//! Policy gate: applies the execution policy to a resolved intent

use crate::planner::{
    ExecutionPolicy, Intent, PolicyDecision, RiskLevel, ToolRegistry,
};

/// Gate outcome for a resolved intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// Proceed to command synthesis
    Allowed,
    /// Surface `ApprovalRequired` and wait for the user
    NeedsConfirmation { reason: String, risk: RiskLevel },
    /// No command is built; the denial reason is surfaced
    Denied { reason: String },
}

/// Applies the execution policy before any command is synthesized.
pub struct PolicyGate {
    policy: ExecutionPolicy,
}

impl PolicyGate {
    pub fn new(policy: ExecutionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ExecutionPolicy {
        &self.policy
    }

    /// Check an intent against the policy.
    ///
    /// Non-actionable intents (info_query, unknown) pass: they never reach
    /// the command builder. Intents whose tool carries no tactic
    /// classification are allowed on their risk alone.
    pub fn check(&self, intent: &Intent, registry: &ToolRegistry) -> GateOutcome {
        if !intent.kind.is_actionable() {
            return GateOutcome::Allowed;
        }

        let Some(def) = registry.get(intent.kind) else {
            return GateOutcome::Denied {
                reason: format!("no tool registered for intent {}", intent.kind.as_str()),
            };
        };

        let Some(tactic) = def.tactic else {
            return GateOutcome::Allowed;
        };

        match self
            .policy
            .decide(tactic, def.risk, def.creates_persistent_change)
        {
            PolicyDecision::AllowAuto => GateOutcome::Allowed,
            PolicyDecision::AllowWithConfirmation(reason) => GateOutcome::NeedsConfirmation {
                reason,
                risk: def.risk,
            },
            PolicyDecision::Deny(reason) => GateOutcome::Denied { reason },
        }
    }
}

impl Default for PolicyGate {
    fn default() -> Self {
        Self::new(ExecutionPolicy::default())
    }
}
