//! Human approval for side effects.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Asks an operator whether a proposed side effect may go ahead.
#[async_trait]
pub trait ConfirmationGate: Send + Sync {
    /// Present `prompt` and wait for an answer. `true` approves.
    async fn confirm(&self, prompt: &str) -> bool;
}

/// How confirmation requests are answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmPolicy {
    /// Ask the operator.
    #[default]
    Ask,
    /// Approve without asking.
    Allow,
    /// Reject without asking.
    Deny,
}

impl ConfirmPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfirmPolicy::Ask => "ask",
            ConfirmPolicy::Allow => "allow",
            ConfirmPolicy::Deny => "deny",
        }
    }
}

impl fmt::Display for ConfirmPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfirmPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ask" => Ok(ConfirmPolicy::Ask),
            "allow" => Ok(ConfirmPolicy::Allow),
            "deny" => Ok(ConfirmPolicy::Deny),
            other => Err(format!(
                "invalid confirm policy '{other}' (expected ask, allow or deny)"
            )),
        }
    }
}

/// Applies a [`ConfirmPolicy`], delegating `Ask` to an interactive gate.
///
/// Without an interactive gate, `Ask` rejects so nothing ever blocks on a
/// prompt nobody can answer.
#[derive(Clone)]
pub struct PolicyGate {
    policy: ConfirmPolicy,
    interactive: Option<Arc<dyn ConfirmationGate>>,
}

impl PolicyGate {
    /// A gate with no interactive fallback.
    pub fn new(policy: ConfirmPolicy) -> Self {
        Self {
            policy,
            interactive: None,
        }
    }

    /// Use `gate` for requests the policy says to ask about.
    pub fn with_interactive(mut self, gate: Arc<dyn ConfirmationGate>) -> Self {
        self.interactive = Some(gate);
        self
    }

    pub fn policy(&self) -> ConfirmPolicy {
        self.policy
    }
}

#[async_trait]
impl ConfirmationGate for PolicyGate {
    async fn confirm(&self, prompt: &str) -> bool {
        match (self.policy, &self.interactive) {
            (ConfirmPolicy::Allow, _) => {
                debug!(prompt, "Auto-approved by policy");
                true
            }
            (ConfirmPolicy::Deny, _) => {
                debug!(prompt, "Auto-rejected by policy");
                false
            }
            (ConfirmPolicy::Ask, Some(gate)) => gate.confirm(prompt).await,
            (ConfirmPolicy::Ask, None) => {
                warn!(prompt, "No interactive gate available, rejecting");
                false
            }
        }
    }
}
