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

//! Component and Bundle traits
//!
//! Components are data attached to entities.
//! Bundles group multiple components for spawning, inserting and removing.

use smallvec::SmallVec;

use crate::bitset::Signature;
use crate::error::{EcsError, Result};
use crate::registry::{ComponentId, ComponentRegistry};

/// Maximum number of components supported by Bundle implementations
pub const MAX_BUNDLE_COMPONENTS: usize = 12;

/// Component ids of a bundle, in bundle field order
pub type BundleIds = SmallVec<[ComponentId; MAX_BUNDLE_COMPONENTS]>;

/// Marker trait for components
///
/// Components must be 'static (no borrowed data)
pub trait Component: 'static + Send + Sync {}

/// Automatically implement Component for all valid types
impl<T: 'static + Send + Sync> Component for T {}

/// Bundle of components
///
/// Implemented for tuples of 1 to 12 components.
pub trait Bundle: Send + Sync + 'static {
    /// Register every component of the bundle and return their ids in field order.
    ///
    /// Fails with `DuplicateComponent` when one type appears twice.
    fn component_ids(registry: &ComponentRegistry) -> Result<BundleIds>
    where
        Self: Sized;

    /// Move components into raw slot pointers, one per field
    ///
    /// # Safety
    /// `ptrs` must hold one valid, aligned, uninitialized slot per field,
    /// in the order returned by `component_ids`.
    unsafe fn write_components(self, ptrs: &[*mut u8]);

    /// Move components out of raw slot pointers
    ///
    /// # Safety
    /// `ptrs` must hold one initialized slot per field in `component_ids`
    /// order. The slots are logically uninitialized afterwards.
    unsafe fn read_components(ptrs: &[*const u8]) -> Self
    where
        Self: Sized;
}

/// Signature of a bundle's ids, rejecting repeated types
pub(crate) fn bundle_signature(
    ids: &[ComponentId],
    registry: &ComponentRegistry,
) -> Result<Signature> {
    let mut signature = Signature::EMPTY;
    for &id in ids {
        if signature.contains(id) {
            return Err(EcsError::DuplicateComponent(registry.name(id)));
        }
        signature.set(id);
    }
    Ok(signature)
}

// Macro for tuple Bundle implementations
macro_rules! impl_bundle {
    ($($T:ident),*) => {
        impl<$($T: Component),*> Bundle for ($($T,)*) {
            fn component_ids(registry: &ComponentRegistry) -> Result<BundleIds> {
                let mut ids = BundleIds::new();
                $(ids.push(registry.register::<$T>()?);)*
                bundle_signature(&ids, registry)?;
                Ok(ids)
            }

            #[allow(non_snake_case)]
            unsafe fn write_components(self, ptrs: &[*mut u8]) {
                let ($($T,)*) = self;
                let mut ptrs = ptrs.iter();
                $(
                    if let Some(&ptr) = ptrs.next() {
                        std::ptr::write(ptr as *mut $T, $T);
                    }
                )*
            }

            unsafe fn read_components(ptrs: &[*const u8]) -> Self {
                let mut ptrs = ptrs.iter();
                ($(std::ptr::read(*ptrs.next().unwrap_unchecked() as *const $T),)*)
            }
        }
    };
}

impl_bundle!(A);
impl_bundle!(A, B);
impl_bundle!(A, B, C);
impl_bundle!(A, B, C, D);
impl_bundle!(A, B, C, D, E);
impl_bundle!(A, B, C, D, E, F);
impl_bundle!(A, B, C, D, E, F, G);
impl_bundle!(A, B, C, D, E, F, G, H);
impl_bundle!(A, B, C, D, E, F, G, H, I);
impl_bundle!(A, B, C, D, E, F, G, H, I, J);
impl_bundle!(A, B, C, D, E, F, G, H, I, J, K);
impl_bundle!(A, B, C, D, E, F, G, H, I, J, K, L);

#[cfg(test)]
mod tests {
    #![allow(dead_code)]
    use super::*;
    use std::mem::MaybeUninit;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Velocity {
        x: f32,
    }

    #[test]
    fn test_component_ids_follow_field_order() {
        let registry = ComponentRegistry::new();
        let vel = registry.register::<Velocity>().unwrap();

        let ids = <(Position, Velocity)>::component_ids(&registry).unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[1], vel);
        assert_eq!(registry.id_of::<Position>(), Some(ids[0]));
    }

    #[test]
    fn test_duplicate_type_in_bundle() {
        let registry = ComponentRegistry::new();
        let err = <(Position, Velocity, Position)>::component_ids(&registry).unwrap_err();
        assert!(matches!(err, EcsError::DuplicateComponent(_)));
    }

    #[test]
    fn test_write_then_read_moves_values() {
        let mut pos = MaybeUninit::<Position>::uninit();
        let mut name = MaybeUninit::<String>::uninit();
        let ptrs = [pos.as_mut_ptr() as *mut u8, name.as_mut_ptr() as *mut u8];

        unsafe {
            (Position { x: 1.0, y: 2.0 }, String::from("walker")).write_components(&ptrs);
            let read_ptrs = [ptrs[0] as *const u8, ptrs[1] as *const u8];
            let (p, n) = <(Position, String)>::read_components(&read_ptrs);
            assert_eq!(p, Position { x: 1.0, y: 2.0 });
            assert_eq!(n, "walker");
        }
    }
}
