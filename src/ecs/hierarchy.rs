//! Entity hierarchy
//!
//! Parent-child relationships between entities, the structural operations
//! that change them, and the scene-membership cascades those changes trigger.
//!
//! # Scene membership
//!
//! Entering a scene happens in two phases: the scene back-reference is set
//! across the whole subtree first, then `on_added_to_scene` fires depth-first
//! with each entity's components notified before its children. Leaving runs
//! the other way round: `on_removed_from_scene` fires children first, then
//! components, while the subtree is still attached, and only then are the
//! back-references cleared.
//!
//! Each entity tracks whether it is live in its scene, so hooks fire exactly
//! once per transition even when a hook restructures the tree mid-cascade.

use smallvec::SmallVec;

use crate::core::error::HierarchyError;
use crate::core::scene::SceneId;
use crate::ecs::world::Hook;
use crate::ecs::{EntityId, World};

/// Snapshot of a child list, iterated while the hierarchy may change.
pub(crate) type ChildSnapshot = SmallVec<[EntityId; 8]>;

/// Ordered list of an entity's children
#[derive(Debug, Clone, Default)]
pub struct Children(SmallVec<[EntityId; 8]>);

impl Children {
    /// Create an empty children list
    #[must_use]
    pub fn new() -> Self {
        Self(SmallVec::new())
    }

    /// Append a child
    pub fn push(&mut self, child: EntityId) {
        self.0.push(child);
    }

    /// Remove a child by moving the last entry into its place.
    ///
    /// O(1), does not preserve order.
    pub fn swap_remove(&mut self, child: EntityId) -> bool {
        if let Some(pos) = self.0.iter().position(|&e| e == child) {
            self.0.swap_remove(pos);
            true
        } else {
            false
        }
    }

    /// Check whether `child` is in the list
    #[must_use]
    pub fn contains(&self, child: EntityId) -> bool {
        self.0.contains(&child)
    }

    /// Check if there are no children
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get the number of children
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate over children
    pub fn iter(&self) -> impl Iterator<Item = &EntityId> {
        self.0.iter()
    }

    /// Children as a slice
    #[must_use]
    pub fn as_slice(&self) -> &[EntityId] {
        &self.0
    }

    pub(crate) fn snapshot(&self) -> ChildSnapshot {
        self.0.clone()
    }

    pub(crate) fn clear(&mut self) {
        self.0.clear();
    }
}

/// Iterator over an entity's ancestors, nearest first
pub struct Ancestors<'w> {
    world: &'w World,
    next: Option<EntityId>,
}

impl Iterator for Ancestors<'_> {
    type Item = EntityId;

    fn next(&mut self) -> Option<EntityId> {
        let current = self.next?;
        self.next = self.world.parent(current);
        Some(current)
    }
}

/// Depth-first pre-order iterator over a subtree, starting with its root
pub struct Subtree<'w> {
    world: &'w World,
    stack: Vec<EntityId>,
}

impl Iterator for Subtree<'_> {
    type Item = EntityId;

    fn next(&mut self) -> Option<EntityId> {
        let current = self.stack.pop()?;
        self.stack
            .extend(self.world.children(current).iter().rev().copied());
        Some(current)
    }
}

// ============================================================================
// Navigation
// ============================================================================

impl World {
    /// Parent of `entity`, or `None` for roots, detached or stale entities.
    #[must_use]
    pub fn parent(&self, entity: EntityId) -> Option<EntityId> {
        self.entities.get(entity).and_then(|node| node.parent)
    }

    /// Children of `entity` in collection order. Empty for a stale id.
    #[must_use]
    pub fn children(&self, entity: EntityId) -> &[EntityId] {
        self.entities
            .get(entity)
            .map(|node| node.children.as_slice())
            .unwrap_or_default()
    }

    /// Number of children.
    #[must_use]
    pub fn child_count(&self, entity: EntityId) -> usize {
        self.children(entity).len()
    }

    /// Scene the entity currently belongs to.
    #[must_use]
    pub fn scene_of(&self, entity: EntityId) -> Option<SceneId> {
        self.entities.get(entity).and_then(|node| node.scene)
    }

    /// Ancestors of `entity`, nearest first, excluding `entity` itself.
    pub fn ancestors(&self, entity: EntityId) -> Ancestors<'_> {
        Ancestors {
            world: self,
            next: self.parent(entity),
        }
    }

    /// `entity` followed by every descendant in depth-first pre-order.
    pub fn subtree(&self, entity: EntityId) -> Subtree<'_> {
        let stack = if self.contains_entity(entity) {
            vec![entity]
        } else {
            Vec::new()
        };
        Subtree { world: self, stack }
    }

    /// Every descendant of `entity` in depth-first pre-order.
    pub fn descendants(&self, entity: EntityId) -> impl Iterator<Item = EntityId> + '_ {
        self.subtree(entity).skip(1)
    }

    /// Number of ancestors. Roots are at depth 0.
    #[must_use]
    pub fn depth(&self, entity: EntityId) -> usize {
        self.ancestors(entity).count()
    }

    /// Topmost ancestor, or `entity` itself if it has no parent.
    #[must_use]
    pub fn root_of(&self, entity: EntityId) -> EntityId {
        self.ancestors(entity).last().unwrap_or(entity)
    }

    /// Whether `ancestor` is a strict ancestor of `entity`.
    #[must_use]
    pub fn is_ancestor(&self, ancestor: EntityId, entity: EntityId) -> bool {
        self.ancestors(entity).any(|e| e == ancestor)
    }

    /// First entity named `name` in a depth-first search that starts with
    /// `entity` itself.
    #[must_use]
    pub fn find_child_entity_with_name(&self, entity: EntityId, name: &str) -> Option<EntityId> {
        self.subtree(entity).find(|&e| self.has_name(e, name))
    }

    /// First direct child named `name`.
    #[must_use]
    pub fn immediate_child_with_name(&self, entity: EntityId, name: &str) -> Option<EntityId> {
        self.children(entity)
            .iter()
            .copied()
            .find(|&child| self.has_name(child, name))
    }

    // ========================================================================
    // Structure
    // ========================================================================

    /// Attach `child` beneath `parent`.
    ///
    /// The child's transform is linked beneath the parent's. If the parent is
    /// in a scene, the child's subtree joins it, and its hooks fire when the
    /// parent is live there.
    ///
    /// # Panics
    ///
    /// Panics if the child already has a parent or a scene, if `child` is
    /// `parent` or one of its ancestors, or if either id is stale.
    #[track_caller]
    pub fn add_child(&mut self, parent: EntityId, child: EntityId) {
        let parent_node = self.entity_node(parent);
        let (scene, live, parent_transform) =
            (parent_node.scene, parent_node.scene_live, parent_node.transform);

        let child_node = self.entity_node(child);
        let child_transform = child_node.transform;
        if let Some(existing) = child_node.parent {
            HierarchyError::AlreadyParented {
                child,
                parent: existing,
            }
            .raise();
        }
        if let Some(scene) = child_node.scene {
            HierarchyError::AlreadyInScene {
                entity: child,
                scene,
            }
            .raise();
        }
        if child == parent || self.is_ancestor(child, parent) {
            HierarchyError::WouldCreateCycle { parent, child }.raise();
        }

        self.entity_node_mut(parent).children.push(child);
        self.entity_node_mut(child).parent = Some(parent);
        self.transforms.add_child(parent_transform, child_transform);
        log::debug!("entity {child:?} attached to {parent:?}");

        if let Some(scene) = scene {
            self.enter_scene(child, scene, live);
        }
    }

    /// Detach `child` from `parent`.
    ///
    /// If the parent is in a scene the child's subtree leaves it first,
    /// with hooks firing while everything is still attached. Removal swaps
    /// the last child into the vacated slot, so sibling order is not kept.
    ///
    /// # Panics
    ///
    /// Panics if `child` is not a child of `parent`.
    #[track_caller]
    pub fn remove_child(&mut self, parent: EntityId, child: EntityId) {
        let parent_node = self.entity_node(parent);
        if !parent_node.children.contains(child) {
            HierarchyError::NotAChild { parent, child }.raise();
        }
        let (in_scene, parent_transform) = (parent_node.scene.is_some(), parent_node.transform);

        if in_scene {
            self.leave_scene(child);
        }

        // A removal hook may already have detached it.
        let Some(parent_node) = self.entities.get_mut(parent) else {
            return;
        };
        if !parent_node.children.swap_remove(child) {
            return;
        }
        if let Some(child_node) = self.entities.get_mut(child) {
            child_node.parent = None;
            let child_transform = child_node.transform;
            self.transforms.remove_child(parent_transform, child_transform);
        }
        log::debug!("entity {child:?} detached from {parent:?}");
    }

    /// Detach every child of `entity`.
    #[track_caller]
    pub fn remove_all_children(&mut self, entity: EntityId) {
        let children = self.entity_node(entity).children.snapshot();
        for child in children {
            if self.parent(child) == Some(entity) {
                self.remove_child(entity, child);
            }
        }
    }

    /// Detach `entity` from its parent, or from its scene if it is a root.
    ///
    /// # Panics
    ///
    /// Panics if the entity has neither a parent nor a scene.
    #[track_caller]
    pub fn remove_from_parent(&mut self, entity: EntityId) {
        let node = self.entity_node(entity);
        match (node.parent, node.scene) {
            (Some(parent), _) => self.remove_child(parent, entity),
            (None, Some(_)) => self.remove_from_scene(entity),
            (None, None) => HierarchyError::Detached(entity).raise(),
        }
    }

    // ========================================================================
    // Scene cascades
    // ========================================================================

    /// Give the subtree a scene, then fire its added hooks if requested.
    pub(crate) fn enter_scene(&mut self, entity: EntityId, scene: SceneId, fire_hooks: bool) {
        self.set_subtree_scene(entity, Some(scene));
        if fire_hooks {
            self.fire_added_to_scene(entity);
        }
    }

    /// Fire the subtree's removed hooks, then clear its scene.
    pub(crate) fn leave_scene(&mut self, entity: EntityId) {
        self.fire_removed_from_scene(entity);
        self.set_subtree_scene(entity, None);
    }

    fn set_subtree_scene(&mut self, entity: EntityId, scene: Option<SceneId>) {
        let Some(node) = self.entities.get_mut(entity) else {
            return;
        };
        node.scene = scene;
        if scene.is_none() {
            node.scene_live = false;
        }
        let children = node.children.snapshot();
        for child in children {
            self.set_subtree_scene(child, scene);
        }
    }

    pub(crate) fn fire_added_to_scene(&mut self, entity: EntityId) {
        let Some(node) = self.entities.get_mut(entity) else {
            return;
        };
        if node.scene.is_none() || node.scene_live {
            return;
        }
        node.scene_live = true;
        log::debug!("entity {entity:?} entered scene {:?}", node.scene);

        let components = node.components.clone();
        let children = node.children.snapshot();

        for component in components {
            if self.is_live(entity) && self.component_owner(component) == Some(entity) {
                self.run_hook(entity, component, Hook::AddedToScene);
            }
        }
        for child in children {
            if self.parent(child) == Some(entity) {
                self.fire_added_to_scene(child);
            }
        }
    }

    fn fire_removed_from_scene(&mut self, entity: EntityId) {
        let Some(node) = self.entities.get(entity) else {
            return;
        };
        let children = node.children.snapshot();
        for child in children {
            if self.parent(child) == Some(entity) {
                self.fire_removed_from_scene(child);
            }
        }

        let Some(node) = self.entities.get_mut(entity) else {
            return;
        };
        if !node.scene_live {
            return;
        }
        node.scene_live = false;
        log::debug!("entity {entity:?} leaving scene {:?}", node.scene);

        let components = node.components.clone();
        for component in components {
            if self.component_owner(component) == Some(entity) {
                self.run_hook(entity, component, Hook::RemovedFromScene);
            }
        }
    }

    /// Whether the entity is in a scene and its added hooks have fired.
    #[must_use]
    pub fn is_live(&self, entity: EntityId) -> bool {
        self.entities.get(entity).is_some_and(|node| node.scene_live)
    }
}
