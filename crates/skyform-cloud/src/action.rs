//! Planned actions and apply results

use serde::{Deserialize, Serialize};
use skyform_core::Address;
use std::collections::BTreeMap;

/// A planned action for one resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    /// Resource address
    pub address: Address,

    /// Type of action to perform
    pub action_type: ActionType,

    /// Human-readable description
    pub description: String,

    /// Planned arguments; unknown values show as `(known after apply)`,
    /// sensitive ones as `(sensitive)`
    pub details: BTreeMap<String, serde_json::Value>,
}

impl Action {
    pub fn new(address: Address, action_type: ActionType) -> Self {
        let description = match action_type {
            ActionType::Create => format!("{} will be created", address),
            ActionType::Read => format!("{} will be read", address),
            ActionType::Delete => format!("{} will be destroyed", address),
            ActionType::NoOp => format!("{} is up to date", address),
        };
        Self {
            address,
            action_type,
            description,
            details: BTreeMap::new(),
        }
    }

    pub fn with_details(mut self, details: BTreeMap<String, serde_json::Value>) -> Self {
        self.details = details;
        self
    }
}

/// Type of action to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Create a managed resource
    Create,
    /// Query a data source
    Read,
    /// Delete a managed resource
    Delete,
    /// Already present in state
    NoOp,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionType::Create => write!(f, "create"),
            ActionType::Read => write!(f, "read"),
            ActionType::Delete => write!(f, "delete"),
            ActionType::NoOp => write!(f, "no-op"),
        }
    }
}

/// Result of applying or destroying
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplyResult {
    /// Successfully applied actions
    pub succeeded: Vec<ActionResult>,

    /// Failed actions
    pub failed: Vec<ActionResult>,

    /// Resources not attempted because an earlier step failed
    pub skipped: Vec<String>,

    /// Total execution time in milliseconds
    pub duration_ms: u64,
}

impl ApplyResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn add_success(&mut self, address: String, message: String) {
        self.succeeded.push(ActionResult {
            address,
            success: true,
            message,
            error: None,
        });
    }

    pub fn add_failure(&mut self, address: String, error: String) {
        self.failed.push(ActionResult {
            address,
            success: false,
            message: String::new(),
            error: Some(error),
        });
    }
}

/// Result of a single action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    pub address: String,

    pub success: bool,

    /// Success message
    pub message: String,

    /// Error message if failed
    pub error: Option<String>,
}

/// Ordered list of actions
///
/// Deletions of resources no longer declared come first (reverse dependency
/// order), followed by reads and creations in dependency order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Plan {
    pub actions: Vec<Action>,

    /// Whether the plan has any changes
    pub has_changes: bool,
}

impl Plan {
    pub fn new(actions: Vec<Action>) -> Self {
        let has_changes = actions
            .iter()
            .any(|a| matches!(a.action_type, ActionType::Create | ActionType::Delete));
        Self {
            actions,
            has_changes,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Get actions by type
    pub fn actions_by_type(&self, action_type: ActionType) -> Vec<&Action> {
        self.actions
            .iter()
            .filter(|a| a.action_type == action_type)
            .collect()
    }

    pub fn action_for(&self, address: &Address) -> Option<&Action> {
        self.actions.iter().find(|a| &a.address == address)
    }

    /// Summary of the plan
    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            create: self.actions_by_type(ActionType::Create).len(),
            read: self.actions_by_type(ActionType::Read).len(),
            delete: self.actions_by_type(ActionType::Delete).len(),
            no_change: self.actions_by_type(ActionType::NoOp).len(),
        }
    }
}

/// Summary of planned actions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanSummary {
    pub create: usize,
    pub read: usize,
    pub delete: usize,
    pub no_change: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to create, {} to destroy, {} unchanged",
            self.create, self.delete, self.no_change
        )?;
        if self.read > 0 {
            write!(f, " ({} data sources to read)", self.read)?;
        }
        Ok(())
    }
}
