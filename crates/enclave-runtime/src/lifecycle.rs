use crate::DomainError;
use serde::{Deserialize, Serialize};

/// Lifecycle of an isolation domain.
///
/// `Constructed` → `Bound` (strategies installed) → `Active` (first library
/// materialized) → `TornDown`. A domain may also materialize straight from a path
/// before binding, and any live state may be torn down.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DomainState {
    Constructed,
    Bound,
    Active,
    TornDown,
}

impl std::fmt::Display for DomainState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DomainState::Constructed => write!(f, "constructed"),
            DomainState::Bound => write!(f, "bound"),
            DomainState::Active => write!(f, "active"),
            DomainState::TornDown => write!(f, "torn-down"),
        }
    }
}

pub fn validate_transition(from: DomainState, to: DomainState) -> Result<(), DomainError> {
    let valid = matches!(
        (from, to),
        (DomainState::Constructed, DomainState::Bound)
            | (
                DomainState::Constructed | DomainState::Bound | DomainState::Active,
                DomainState::Active | DomainState::TornDown
            )
    );

    if valid {
        Ok(())
    } else {
        Err(DomainError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}
