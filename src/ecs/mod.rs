//! Entity hierarchy core
//!
//! Entities arranged in a parent-child tree, decorated with components and
//! carrying a lazily cached transform each. Everything is owned by a
//! [`World`] and addressed by generation-checked ids.

pub mod component;
pub mod hierarchy;
pub mod transform;
pub mod world;

#[cfg(test)]
pub(crate) mod test_support;

pub use component::{AsAny, Capability, Component, ComponentContext, QueryMask, mask_matches};
pub use hierarchy::{Ancestors, Children, Subtree};
pub use transform::{Transform, TransformId, TransformStore};
pub use world::{ComponentId, EntityId, World};
