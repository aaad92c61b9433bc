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

//! Component type registry
//!
//! Assigns every component type a dense [`ComponentId`] on first use and keeps
//! the layout/drop metadata the untyped storage layer needs. Ids are never
//! reclaimed. The registry is shared by reference (usually through an `Arc`)
//! rather than living in a static, so several worlds can agree on ids.

use std::alloc::Layout;
use std::any::{type_name, TypeId};

use ahash::AHashMap;
use parking_lot::RwLock;

use crate::bitset::MAX_COMPONENTS;
use crate::component::Component;
use crate::error::{EcsError, Result};

/// Dense numeric id of a registered component type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(u16);

impl ComponentId {
    #[inline]
    pub(crate) const fn new(index: usize) -> Self {
        Self(index as u16)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Storage metadata for one component type
#[derive(Debug, Clone, Copy)]
pub struct ComponentInfo {
    pub id: ComponentId,
    pub type_id: TypeId,
    pub name: &'static str,
    pub layout: Layout,
    pub drop_fn: Option<unsafe fn(*mut u8)>,
}

impl ComponentInfo {
    fn of<T: Component>(id: ComponentId) -> Self {
        Self {
            id,
            type_id: TypeId::of::<T>(),
            name: type_name::<T>(),
            layout: Layout::new::<T>(),
            drop_fn: if std::mem::needs_drop::<T>() {
                Some(drop_erased::<T> as unsafe fn(*mut u8))
            } else {
                None
            },
        }
    }

    /// Element size in bytes
    #[inline]
    pub fn size(&self) -> usize {
        self.layout.size()
    }
}

unsafe fn drop_erased<T>(ptr: *mut u8) {
    std::ptr::drop_in_place(ptr as *mut T);
}

struct RegistryInner {
    by_type: AHashMap<TypeId, ComponentId>,
    infos: Vec<ComponentInfo>,
}

/// Thread-safe get-or-assign table of component ids
pub struct ComponentRegistry {
    capacity: usize,
    inner: RwLock<RegistryInner>,
}

impl ComponentRegistry {
    /// Registry that accepts up to [`MAX_COMPONENTS`] types
    pub fn new() -> Self {
        Self {
            capacity: MAX_COMPONENTS,
            inner: RwLock::new(RegistryInner {
                by_type: AHashMap::with_capacity(64),
                infos: Vec::with_capacity(64),
            }),
        }
    }

    /// Registry with a lower type cap
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        if capacity == 0 || capacity > MAX_COMPONENTS {
            return Err(EcsError::InvalidConfig(format!(
                "max_component_types must be in 1..={MAX_COMPONENTS}, got {capacity}"
            )));
        }
        let mut registry = Self::new();
        registry.capacity = capacity;
        Ok(registry)
    }

    /// Id for `T`, assigning the next free id on first use.
    ///
    /// Concurrent first use of the same type yields a single id: the write
    /// path re-checks the table under the exclusive lock.
    pub fn register<T: Component>(&self) -> Result<ComponentId> {
        let type_id = TypeId::of::<T>();
        if let Some(&id) = self.inner.read().by_type.get(&type_id) {
            return Ok(id);
        }

        let mut inner = self.inner.write();
        if let Some(&id) = inner.by_type.get(&type_id) {
            return Ok(id);
        }

        let registered = inner.infos.len();
        if registered >= self.capacity {
            tracing::error!(
                component = type_name::<T>(),
                capacity = self.capacity,
                "component type capacity exceeded"
            );
            return Err(EcsError::CapacityExceeded {
                registered,
                capacity: self.capacity,
            });
        }

        let id = ComponentId::new(registered);
        inner.infos.push(ComponentInfo::of::<T>(id));
        inner.by_type.insert(type_id, id);
        tracing::debug!(component = type_name::<T>(), id = id.index(), "registered component");
        Ok(id)
    }

    /// Id for `T` if it has been registered
    pub fn id_of<T: Component>(&self) -> Option<ComponentId> {
        self.id_of_type(TypeId::of::<T>())
    }

    pub fn id_of_type(&self, type_id: TypeId) -> Option<ComponentId> {
        self.inner.read().by_type.get(&type_id).copied()
    }

    pub fn info(&self, id: ComponentId) -> Option<ComponentInfo> {
        self.inner.read().infos.get(id.index()).copied()
    }

    /// Type name for diagnostics
    pub fn name(&self, id: ComponentId) -> &'static str {
        self.info(id).map(|info| info.name).unwrap_or("<unregistered>")
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.inner.read().infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}
