//! Core module
//!
//! Configuration, errors, change notification, diagnostics and the scene
//! registry that drives the entity hierarchy.

pub mod config;
pub mod debug;
pub mod error;
pub mod events;
pub mod scene;

pub use config::WorldConfig;
pub use debug::{EntitySnapshot, HierarchyStats};
pub use error::{ConfigError, HierarchyError};
pub use events::{Connection, TransformChangedEvent};
pub use scene::{Scene, SceneId};
