//! Shared domain vocabulary for the payer data broker
//!
//! Every other crate in the workspace speaks in these terms:
//! - `DataScope`: the unit of patient consent and of adapter capability
//! - `ActorType`: who performed an audited action
//! - `HealthState`: payer integration health as observed by health checks

pub mod scope;

pub use scope::*;

use serde::{Deserialize, Serialize};

/// Who performed an audited or consent-related action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    /// Staff member acting through the practice UI or API
    User,
    /// The patient, authenticated by token possession only
    Patient,
    /// Background jobs and sweeps
    System,
}

impl ActorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Patient => "patient",
            Self::System => "system",
        }
    }
}

/// Payer integration health as recorded by the health-check sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    Degraded,
    Down,
}

impl HealthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Down => "down",
        }
    }
}
