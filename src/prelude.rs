//! Convenient re-exports of commonly used types.
//!
//! The prelude can be imported with:
//! ```
//! use chunk_ecs::prelude::*;
//! ```

pub use crate::command::CommandBuffer;
pub use crate::component::{Bundle, Component};
pub use crate::config::WorldConfig;
pub use crate::debug::WorldInspector;
pub use crate::entity::EntityId;
pub use crate::error::{EcsError, Result};
pub use crate::observer::{EntityEvent, Observer};
pub use crate::query::{Filter, Query, QueryMut, QueryState};
pub use crate::world::World;
