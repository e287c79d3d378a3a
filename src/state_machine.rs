use crate::errors::ConsentError;
use crate::settings::Statuses;
use std::collections::{HashMap, HashSet};

/// Configuration-driven status state machine. The valid status vocabulary is
/// not hard-coded: terminal statuses and (optionally) an allowed-transition
/// table come from settings, so different regulatory profiles can define
/// their own intermediate statuses.
#[derive(Debug, Clone)]
pub struct StatusStateMachine {
    terminal: HashSet<String>,
    allowed_transitions: HashMap<String, Vec<String>>,
}

impl StatusStateMachine {
    pub fn new(cfg: &Statuses) -> Self {
        Self {
            terminal: cfg.terminal.iter().cloned().collect(),
            allowed_transitions: cfg.allowed_transitions.clone(),
        }
    }

    pub fn is_terminal(&self, status: &str) -> bool {
        self.terminal.contains(status)
    }

    /// Validate a transition before any row is touched. A consent already in
    /// a terminal status may not move again; with a transition table
    /// configured, the move must also be listed for the current status.
    pub fn validate(
        &self,
        consent_id: &str,
        current_status: &str,
        target_status: &str,
    ) -> Result<(), ConsentError> {
        if target_status.is_empty() {
            return Err(ConsentError::Validation(
                "target status is mandatory".to_string(),
            ));
        }

        if self.is_terminal(current_status) {
            return Err(ConsentError::AlreadyTerminal(
                consent_id.to_string(),
                current_status.to_string(),
            ));
        }

        if !self.allowed_transitions.is_empty() {
            let permitted = self
                .allowed_transitions
                .get(current_status)
                .map(|targets| targets.iter().any(|t| t == target_status))
                .unwrap_or(false);
            if !permitted {
                return Err(ConsentError::Validation(format!(
                    "transition {} -> {} is not permitted",
                    current_status, target_status
                )));
            }
        }

        Ok(())
    }
}
