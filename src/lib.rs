//! A scene graph built around a cached transform hierarchy
//!
//! This crate provides:
//! - Entities arranged in a parent-child tree, addressed by generational ids
//! - Transforms whose world matrices are recomputed lazily on read
//! - Components with scene-lifecycle hooks and capability-based lookup
//! - A minimal scene registry driving per-frame and fixed-step ticks

pub mod core;
pub mod ecs;

// Re-exports for convenience
pub use glam;

/// Prelude module for common imports
pub mod prelude {
    pub use crate::core::{
        Connection, EntitySnapshot, HierarchyStats, SceneId, TransformChangedEvent, WorldConfig,
    };
    pub use crate::ecs::{
        Capability, Component, ComponentContext, ComponentId, EntityId, QueryMask, TransformId,
        TransformStore, World,
    };
    pub use glam::{Mat4, Quat, Vec3};
}
