// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Error types

use std::fmt;

use crate::entity::EntityId;

/// ECS error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
    /// Entity handle was never allocated or has already been despawned
    InvalidEntity(EntityId),

    /// Insert named a component the entity already has
    DuplicateComponent(&'static str),

    /// Remove or fetch named a component the entity lacks
    MissingComponent(&'static str),

    /// Type registry ran out of component ids
    CapacityExceeded { registered: usize, capacity: usize },

    /// Query requested aliasing access to one component
    ConflictingAccess(&'static str),

    /// Cached query state used against a different world
    WorldMismatch,

    /// Rejected world configuration
    InvalidConfig(String),
}

impl fmt::Display for EcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcsError::InvalidEntity(entity) => write!(f, "Invalid entity: {entity:?}"),
            EcsError::DuplicateComponent(name) => {
                write!(f, "Entity already has component {name}")
            }
            EcsError::MissingComponent(name) => write!(f, "Entity lacks component {name}"),
            EcsError::CapacityExceeded {
                registered,
                capacity,
            } => write!(
                f,
                "Component type capacity exceeded: {registered} registered, max is {capacity}"
            ),
            EcsError::ConflictingAccess(name) => {
                write!(f, "Query accesses component {name} more than once mutably")
            }
            EcsError::WorldMismatch => write!(f, "Query state belongs to a different world"),
            EcsError::InvalidConfig(msg) => write!(f, "Invalid world config: {msg}"),
        }
    }
}

impl std::error::Error for EcsError {}

impl From<serde_json::Error> for EcsError {
    fn from(err: serde_json::Error) -> Self {
        EcsError::InvalidConfig(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, EcsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = EcsError::CapacityExceeded {
            registered: 4,
            capacity: 4,
        };
        assert_eq!(
            err.to_string(),
            "Component type capacity exceeded: 4 registered, max is 4"
        );
        assert_eq!(
            EcsError::MissingComponent("Velocity").to_string(),
            "Entity lacks component Velocity"
        );
    }

    #[test]
    fn test_json_error_maps_to_config() {
        let err: EcsError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, EcsError::InvalidConfig(_)));
    }
}
