//! Worker Lifecycle
//!
//! One worker version moves strictly forward through these states.

use serde::{Deserialize, Serialize};

use super::error::{AgentError, AgentResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Installing,
    /// Installed and waiting to take over
    Installed,
    Activating,
    Activated,
    Redundant,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Activated => "activated",
            WorkerState::Redundant => "redundant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "installing" => Some(WorkerState::Installing),
            "installed" => Some(WorkerState::Installed),
            "activating" => Some(WorkerState::Activating),
            "activated" => Some(WorkerState::Activated),
            "redundant" => Some(WorkerState::Redundant),
            _ => None,
        }
    }

    /// Check that `next` may follow `self`
    ///
    /// Any state may become redundant; otherwise only the next step is allowed.
    pub fn advance(self, next: WorkerState) -> AgentResult<WorkerState> {
        use WorkerState::*;
        let allowed = matches!(
            (self, next),
            (Installing, Installed)
                | (Installed, Activating)
                | (Activating, Activated)
                | (_, Redundant)
        ) && self != Redundant;
        if allowed {
            Ok(next)
        } else {
            Err(AgentError::Lifecycle(format!(
                "cannot move from {} to {}",
                self.as_str(),
                next.as_str()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_path() {
        let state = WorkerState::Installing
            .advance(WorkerState::Installed)
            .and_then(|s| s.advance(WorkerState::Activating))
            .and_then(|s| s.advance(WorkerState::Activated))
            .and_then(|s| s.advance(WorkerState::Redundant));
        assert_eq!(state, Ok(WorkerState::Redundant));
    }

    #[test]
    fn test_no_skipping_or_reviving() {
        assert!(WorkerState::Installing.advance(WorkerState::Activated).is_err());
        assert!(WorkerState::Activated.advance(WorkerState::Installing).is_err());
        assert!(WorkerState::Redundant.advance(WorkerState::Redundant).is_err());
        assert!(WorkerState::Installing.advance(WorkerState::Redundant).is_ok());
    }

    #[test]
    fn test_parse() {
        assert_eq!(WorkerState::parse("activated"), Some(WorkerState::Activated));
        assert_eq!(WorkerState::parse(WorkerState::Installed.as_str()), Some(WorkerState::Installed));
        assert_eq!(WorkerState::parse("parsed"), None);
    }
}
