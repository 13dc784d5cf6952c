//! Health reporting.

use serde::{Deserialize, Serialize};

/// Tri-state health of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthState {
    /// Fully functional.
    Ok,
    /// Functional, but serving data that may be stale.
    Warning,
    /// Not able to make decisions.
    Critical,
}

impl HealthState {
    /// Check if the state still allows requests to be served.
    pub fn is_operational(&self) -> bool {
        matches!(self, Self::Ok | Self::Warning)
    }
}

/// A health state together with a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Overall state.
    pub state: HealthState,
    /// Explanation of the state.
    pub message: String,
}

impl HealthCheck {
    /// An OK check.
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            state: HealthState::Ok,
            message: message.into(),
        }
    }

    /// A warning check.
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            state: HealthState::Warning,
            message: message.into(),
        }
    }

    /// A critical check.
    pub fn critical(message: impl Into<String>) -> Self {
        Self {
            state: HealthState::Critical,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operational_states() {
        assert!(HealthState::Ok.is_operational());
        assert!(HealthState::Warning.is_operational());
        assert!(!HealthState::Critical.is_operational());
    }

    #[test]
    fn test_constructors() {
        assert_eq!(HealthCheck::ok("fine").state, HealthState::Ok);
        assert_eq!(HealthCheck::warning("stale").state, HealthState::Warning);
        let critical = HealthCheck::critical("empty");
        assert_eq!(critical.state, HealthState::Critical);
        assert_eq!(critical.message, "empty");
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_string(&HealthState::Warning).unwrap();
        assert_eq!(json, "\"WARNING\"");
    }
}
