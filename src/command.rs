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

//! Deferred structural changes
//!
//! Record spawns, despawns and component changes while a query borrows the
//! world, then apply them in order with [`World::flush_commands`].

use crate::component::Bundle;
use crate::entity::EntityId;
use crate::error::Result;
use crate::world::World;

/// Type alias for world mutation closures
pub type CommandClosure = Box<dyn FnOnce(&mut World) -> Result<()> + Send>;

/// Deferred command for world mutations
pub enum Command {
    /// Spawn entity with closure
    Spawn(CommandClosure),

    /// Despawn entity
    Despawn(EntityId),

    /// Add or remove components
    Modify(EntityId, CommandClosure),

    /// Custom world mutation
    Custom(CommandClosure),
}

impl Command {
    pub(crate) fn apply(self, world: &mut World) -> Result<()> {
        match self {
            Command::Spawn(f) | Command::Custom(f) | Command::Modify(_, f) => f(world),
            Command::Despawn(entity) => world.despawn(entity),
        }
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Spawn(_) => write!(f, "Spawn(...)"),
            Command::Despawn(e) => f.debug_tuple("Despawn").field(e).finish(),
            Command::Modify(e, _) => f.debug_tuple("Modify").field(e).finish(),
            Command::Custom(_) => write!(f, "Custom(...)"),
        }
    }
}

/// Command buffer for deferred operations
#[derive(Default, Debug)]
pub struct CommandBuffer {
    commands: Vec<Command>,
}

impl CommandBuffer {
    /// Create new command buffer
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            commands: Vec::with_capacity(capacity),
        }
    }

    /// Queue a spawn of `bundle`
    pub fn spawn<B: Bundle>(&mut self, bundle: B) {
        self.commands
            .push(Command::Spawn(Box::new(move |world| world.spawn(bundle).map(drop))));
    }

    /// Queue despawn command
    pub fn despawn(&mut self, entity: EntityId) {
        self.commands.push(Command::Despawn(entity));
    }

    /// Queue adding `bundle` to `entity`
    pub fn insert<B: Bundle>(&mut self, entity: EntityId, bundle: B) {
        self.commands.push(Command::Modify(
            entity,
            Box::new(move |world| world.insert(entity, bundle)),
        ));
    }

    /// Queue removing `B`'s components from `entity`; the values are dropped
    pub fn remove<B: Bundle>(&mut self, entity: EntityId) {
        self.commands.push(Command::Modify(
            entity,
            Box::new(move |world| world.remove::<B>(entity).map(drop)),
        ));
    }

    /// Queue a custom world mutation
    pub fn add<F>(&mut self, f: F)
    where
        F: FnOnce(&mut World) -> Result<()> + Send + 'static,
    {
        self.commands.push(Command::Custom(Box::new(f)));
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }
}

impl IntoIterator for CommandBuffer {
    type Item = Command;
    type IntoIter = std::vec::IntoIter<Command>;

    fn into_iter(self) -> Self::IntoIter {
        self.commands.into_iter()
    }
}
