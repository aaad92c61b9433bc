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

//! Component added/removed hooks
//!
//! Observers run synchronously on the thread performing the structural
//! change. They receive the event only, never the world, so they cannot
//! re-enter it while an entity is mid-migration.

use crate::entity::EntityId;
use crate::registry::ComponentId;

/// Entity lifecycle events delivered to observers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityEvent {
    /// Entity was spawned (created)
    Spawned(EntityId),

    /// Entity was despawned (destroyed)
    Despawned(EntityId),

    /// Component was added to entity
    ComponentAdded(EntityId, ComponentId),

    /// Component was removed from entity
    ComponentRemoved(EntityId, ComponentId),
}

impl EntityEvent {
    /// Get the entity involved in this event
    pub fn entity_id(&self) -> EntityId {
        match *self {
            EntityEvent::Spawned(id)
            | EntityEvent::Despawned(id)
            | EntityEvent::ComponentAdded(id, _)
            | EntityEvent::ComponentRemoved(id, _) => id,
        }
    }

    /// Component involved, for add/remove events
    pub fn component(&self) -> Option<ComponentId> {
        match *self {
            EntityEvent::ComponentAdded(_, c) | EntityEvent::ComponentRemoved(_, c) => Some(c),
            _ => None,
        }
    }

    /// Get event type name for debugging
    pub fn event_type(&self) -> &'static str {
        match self {
            EntityEvent::Spawned(_) => "Spawned",
            EntityEvent::Despawned(_) => "Despawned",
            EntityEvent::ComponentAdded(_, _) => "ComponentAdded",
            EntityEvent::ComponentRemoved(_, _) => "ComponentRemoved",
        }
    }
}

/// Observer that reacts to entity lifecycle events
pub trait Observer: Send + Sync {
    /// Called when an entity event occurs
    fn on_event(&mut self, event: &EntityEvent);

    /// Get name for debugging
    fn name(&self) -> &str {
        "Observer"
    }
}

impl<F> Observer for F
where
    F: FnMut(&EntityEvent) + Send + Sync,
{
    fn on_event(&mut self, event: &EntityEvent) {
        self(event)
    }

    fn name(&self) -> &str {
        "closure"
    }
}

/// Handle returned by [`ObserverRegistry::register`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u32);

/// Registry that manages all observers
#[derive(Default)]
pub struct ObserverRegistry {
    observers: Vec<(ObserverId, Box<dyn Observer>)>,
    next_id: u32,
}

impl ObserverRegistry {
    /// Create new registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register observer
    pub fn register(&mut self, observer: Box<dyn Observer>) -> ObserverId {
        let id = ObserverId(self.next_id);
        self.next_id += 1;
        tracing::debug!(observer = observer.name(), "registered observer");
        self.observers.push((id, observer));
        id
    }

    /// Remove an observer; returns it if it was registered
    pub fn unregister(&mut self, id: ObserverId) -> Option<Box<dyn Observer>> {
        let index = self.observers.iter().position(|(oid, _)| *oid == id)?;
        Some(self.observers.remove(index).1)
    }

    /// Deliver `event` to every observer in registration order
    pub fn notify(&mut self, event: EntityEvent) {
        for (_, observer) in &mut self.observers {
            observer.on_event(&event);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }
}
