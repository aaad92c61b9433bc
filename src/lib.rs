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

//! Chunked archetype ECS storage core
//!
//! Entities with the same exact component set share an archetype, stored as
//! fixed-capacity struct-of-arrays chunks. Adding or removing a component
//! moves the entity's row between archetypes; queries select archetypes by
//! signature and walk their chunks linearly.

pub mod archetype;
pub mod bitset;
pub mod chunk;
pub mod command;
pub mod component;
pub mod config;
pub mod debug;
pub mod entity;
pub mod error;
pub mod observer;
pub mod prelude;
#[cfg(feature = "profiling")]
pub mod profiling;
pub mod query;
pub mod registry;
pub mod world;

pub use archetype::*;
pub use bitset::*;
pub use chunk::*;
pub use command::*;
pub use component::*;
pub use config::*;
pub use entity::*;
pub use error::*;
pub use observer::*;
pub use query::*;
pub use registry::*;
pub use world::*;
