//! Error types
//!
//! Structural misuse of the hierarchy (double parenting, detaching something
//! that is not attached, stale handles) is a programming error and is never
//! returned to the caller. Operations raise a [`HierarchyError`] as a panic
//! after logging it. Configuration loading deals with external input and
//! reports failures through [`ConfigError`].

use thiserror::Error;

use crate::core::scene::SceneId;
use crate::ecs::{ComponentId, EntityId, TransformId};

/// A violated structural precondition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HierarchyError {
    /// The entity is already the child of another entity.
    #[error("entity {child:?} is already a child of {parent:?}")]
    AlreadyParented {
        /// Entity that was being attached
        child: EntityId,
        /// Its current parent
        parent: EntityId,
    },

    /// The entity already belongs to a scene.
    #[error("entity {entity:?} is already in scene {scene:?}")]
    AlreadyInScene {
        /// Entity that was being attached
        entity: EntityId,
        /// Scene it currently belongs to
        scene: SceneId,
    },

    /// The entity is not a child of the given parent.
    #[error("entity {child:?} is not a child of {parent:?}")]
    NotAChild {
        /// Expected parent
        parent: EntityId,
        /// Entity that was being removed
        child: EntityId,
    },

    /// The entity has neither a parent nor a scene to be removed from.
    #[error("entity {0:?} has no parent and is not in a scene")]
    Detached(EntityId),

    /// The entity is not a root entity registered with a scene.
    #[error("entity {0:?} is not a scene root")]
    NotASceneRoot(EntityId),

    /// Attaching the entity would make it its own ancestor.
    #[error("adding {child:?} beneath {parent:?} would create a cycle")]
    WouldCreateCycle {
        /// Prospective parent
        parent: EntityId,
        /// Prospective child
        child: EntityId,
    },

    /// Linking the transform would make it its own ancestor.
    #[error("linking transform {child:?} beneath {parent:?} would create a cycle")]
    TransformCycle {
        /// Prospective parent transform
        parent: TransformId,
        /// Prospective child transform
        child: TransformId,
    },

    /// The component is already attached to an entity.
    #[error("component {component:?} is already attached to entity {owner:?}")]
    ComponentAlreadyAttached {
        /// Component that was being attached
        component: ComponentId,
        /// Entity that currently owns it
        owner: EntityId,
    },

    /// The component is not attached to the given entity.
    #[error("component {component:?} is not attached to entity {entity:?}")]
    ComponentNotAttached {
        /// Component that was being detached
        component: ComponentId,
        /// Entity it was expected on
        entity: EntityId,
    },

    /// The component is still attached and cannot be taken out of the world.
    #[error("component {component:?} is still attached to entity {owner:?}")]
    ComponentStillAttached {
        /// Component that was being taken
        component: ComponentId,
        /// Entity that currently owns it
        owner: EntityId,
    },

    /// The entity handle does not refer to a live entity.
    #[error("entity {0:?} does not exist")]
    StaleEntity(EntityId),

    /// The component handle does not refer to a live component.
    #[error("component {0:?} does not exist")]
    StaleComponent(ComponentId),

    /// The transform handle does not refer to a live transform.
    #[error("transform {0:?} does not exist")]
    StaleTransform(TransformId),

    /// The scene handle does not refer to a live scene.
    #[error("scene {0:?} does not exist")]
    StaleScene(SceneId),
}

impl HierarchyError {
    /// Log the violation and abort the current operation.
    #[track_caller]
    pub(crate) fn raise(self) -> ! {
        log::error!("hierarchy precondition violated: {self}");
        panic!("{self}");
    }
}

/// Errors that can occur while loading a [`WorldConfig`](crate::core::WorldConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read or written
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The RON text could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// The config could not be serialized
    #[error("Serialization error: {0}")]
    Serialize(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::KeyData;

    #[test]
    fn test_error_messages_name_the_violation() {
        let parent = EntityId::from(KeyData::from_ffi(1));
        let child = EntityId::from(KeyData::from_ffi(2));

        let err = HierarchyError::NotAChild { parent, child };
        assert!(err.to_string().contains("is not a child of"));

        let err = HierarchyError::Detached(child);
        assert!(err.to_string().contains("has no parent"));
    }

    #[test]
    #[should_panic(expected = "does not exist")]
    fn test_raise_panics_with_display_text() {
        let entity = EntityId::from(KeyData::from_ffi(7));
        HierarchyError::StaleEntity(entity).raise();
    }

    #[test]
    fn test_config_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = ConfigError::from(io);
        assert!(err.to_string().starts_with("IO error"));
    }
}
