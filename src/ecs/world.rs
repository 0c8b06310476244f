//! World owning every entity, component, transform and scene
//!
//! Entities, components and transforms live in generational arenas and are
//! addressed by copyable ids. Parent, child, scene and owner links are ids
//! too, so destroying a node can never leave a dangling reference behind: a
//! stale id simply stops resolving.
//!
//! Structural operations live on [`World`] and are spread across modules:
//! this file covers entity and component lifetime, component lookups,
//! naming, visibility and ticking, [`hierarchy`](super::hierarchy) covers
//! parent-child structure and the scene cascades.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use slotmap::{SlotMap, new_key_type};
use smallvec::SmallVec;

use crate::core::config::WorldConfig;
use crate::core::error::HierarchyError;
use crate::core::scene::{Scene, SceneId};
use crate::ecs::component::{Capability, Component, ComponentContext, QueryMask, mask_matches};
use crate::ecs::hierarchy::Children;
use crate::ecs::transform::{TransformId, TransformStore};

new_key_type! {
    /// Generation-checked handle to an entity.
    pub struct EntityId;

    /// Generation-checked handle to a component.
    pub struct ComponentId;
}

/// Per-entity record
pub(crate) struct EntityNode {
    pub(crate) name: String,
    pub(crate) visible: bool,
    pub(crate) parent: Option<EntityId>,
    pub(crate) scene: Option<SceneId>,
    /// Set once the scene-added hooks have fired for this entity
    pub(crate) scene_live: bool,
    pub(crate) children: Children,
    pub(crate) components: SmallVec<[ComponentId; 4]>,
    pub(crate) transform: TransformId,
    pub(crate) animation_controller: Option<Rc<dyn Any>>,
}

impl EntityNode {
    fn new(transform: TransformId) -> Self {
        Self {
            name: String::new(),
            visible: true,
            parent: None,
            scene: None,
            scene_live: false,
            children: Children::new(),
            components: SmallVec::new(),
            transform,
            animation_controller: None,
        }
    }
}

/// Per-component record
pub(crate) struct ComponentSlot {
    /// `None` while the component is checked out to run a hook
    pub(crate) component: Option<Box<dyn Component>>,
    pub(crate) owner: Option<EntityId>,
    pub(crate) type_name: &'static str,
    /// Lifecycle hooks that arrived while checked out, oldest first
    pending: SmallVec<[(EntityId, Hook); 2]>,
    /// Destroyed while checked out; freed once its hook returns
    doomed: bool,
}

/// Lifecycle hook dispatched to a checked-out component.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Hook {
    AddedToEntity,
    RemovedFromEntity,
    AddedToScene,
    RemovedFromScene,
    Update(f32),
    FixedUpdate(f32),
}

impl Hook {
    fn is_lifecycle(self) -> bool {
        !matches!(self, Hook::Update(_) | Hook::FixedUpdate(_))
    }
}

/// Container for the entity hierarchy
pub struct World {
    pub(crate) entities: SlotMap<EntityId, EntityNode>,
    pub(crate) components: SlotMap<ComponentId, ComponentSlot>,
    pub(crate) transforms: TransformStore,
    pub(crate) scenes: SlotMap<SceneId, Scene>,
    config: WorldConfig,
}

impl World {
    /// Create an empty world with the default config
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(WorldConfig::default())
    }

    /// Create an empty world with pre-sized arenas
    #[must_use]
    pub fn with_config(config: WorldConfig) -> Self {
        let mut transforms = TransformStore::with_capacity(config.transform_capacity);
        transforms.set_normalize_orientation(config.normalize_orientation);

        Self {
            entities: SlotMap::with_capacity_and_key(config.entity_capacity),
            components: SlotMap::with_capacity_and_key(config.component_capacity),
            transforms,
            scenes: SlotMap::with_key(),
            config,
        }
    }

    /// Config the world was built with
    #[must_use]
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Transform arena
    #[must_use]
    pub fn transforms(&self) -> &TransformStore {
        &self.transforms
    }

    /// Mutable transform arena
    pub fn transforms_mut(&mut self) -> &mut TransformStore {
        &mut self.transforms
    }

    #[track_caller]
    pub(crate) fn entity_node(&self, entity: EntityId) -> &EntityNode {
        match self.entities.get(entity) {
            Some(node) => node,
            None => HierarchyError::StaleEntity(entity).raise(),
        }
    }

    #[track_caller]
    pub(crate) fn entity_node_mut(&mut self, entity: EntityId) -> &mut EntityNode {
        match self.entities.get_mut(entity) {
            Some(node) => node,
            None => HierarchyError::StaleEntity(entity).raise(),
        }
    }

    #[track_caller]
    fn component_slot(&self, component: ComponentId) -> &ComponentSlot {
        match self.components.get(component) {
            Some(slot) => slot,
            None => HierarchyError::StaleComponent(component).raise(),
        }
    }

    // ========================================================================
    // Entities
    // ========================================================================

    /// Create a detached entity with an identity transform.
    pub fn create_entity(&mut self) -> EntityId {
        let transform = self.transforms.create();
        let entity = self.entities.insert(EntityNode::new(transform));
        log::trace!("created entity {entity:?}");
        entity
    }

    /// Create a detached, named entity.
    pub fn create_named_entity(&mut self, name: impl Into<String>) -> EntityId {
        let entity = self.create_entity();
        self.entity_node_mut(entity).name = name.into();
        entity
    }

    /// Destroy an entity together with its descendants and their components.
    ///
    /// The entity is first detached from its parent or scene, so scene hooks
    /// fire for the whole subtree before anything is freed. Every attached
    /// component then receives `on_removed_from_entity` and is destroyed.
    ///
    /// # Panics
    ///
    /// Panics if the id is stale.
    #[track_caller]
    pub fn destroy_entity(&mut self, entity: EntityId) {
        let node = self.entity_node(entity);
        if node.parent.is_some() || node.scene.is_some() {
            self.remove_from_parent(entity);
        }
        self.destroy_subtree(entity);
    }

    fn destroy_subtree(&mut self, entity: EntityId) {
        let Some(node) = self.entities.get(entity) else {
            return;
        };
        for child in node.children.snapshot() {
            if self.parent(child) == Some(entity) {
                self.destroy_subtree(child);
            }
        }
        let Some(node) = self.entities.get_mut(entity) else {
            return;
        };
        node.children.clear();

        for component in self.remove_all_components(entity) {
            if self.component_owner(component).is_none() {
                self.release_component(component);
            }
        }

        if let Some(node) = self.entities.remove(entity) {
            self.transforms.destroy(node.transform);
            log::debug!("destroyed entity {entity:?} ({:?})", node.name);
        }
    }

    /// Whether the id refers to a live entity.
    #[must_use]
    pub fn contains_entity(&self, entity: EntityId) -> bool {
        self.entities.contains_key(entity)
    }

    /// Number of live entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Iterate over every live entity id.
    pub fn entity_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.keys()
    }

    /// Transform owned by `entity`.
    #[must_use]
    #[track_caller]
    pub fn transform_id(&self, entity: EntityId) -> TransformId {
        self.entity_node(entity).transform
    }

    /// Restore an entity to its freshly created state so it can be pooled.
    ///
    /// Leaves the parent or scene, detaches every component and child, then
    /// clears the name, transform, visibility and animation controller.
    /// Returns the detached components, which stay alive in the world.
    #[track_caller]
    pub fn reset_entity(&mut self, entity: EntityId) -> Vec<ComponentId> {
        let node = self.entity_node(entity);
        if node.parent.is_some() || node.scene.is_some() {
            self.remove_from_parent(entity);
        }
        let detached = self.remove_all_components(entity);
        self.remove_all_children(entity);

        let node = self.entity_node_mut(entity);
        node.name.clear();
        node.visible = true;
        node.animation_controller = None;
        let transform = node.transform;
        self.transforms.reset(transform);

        detached
    }

    // ========================================================================
    // Names, visibility, animation
    // ========================================================================

    /// Rename an entity.
    #[track_caller]
    pub fn set_name(&mut self, entity: EntityId, name: impl Into<String>) {
        self.entity_node_mut(entity).name = name.into();
    }

    /// Entity name, `None` for a stale id.
    #[must_use]
    pub fn name(&self, entity: EntityId) -> Option<&str> {
        self.entities.get(entity).map(|node| node.name.as_str())
    }

    /// Whether the entity is called `name`.
    #[must_use]
    pub fn has_name(&self, entity: EntityId, name: &str) -> bool {
        self.name(entity) == Some(name)
    }

    /// Set the entity's own visibility flag.
    #[track_caller]
    pub fn set_visible(&mut self, entity: EntityId, visible: bool) {
        self.entity_node_mut(entity).visible = visible;
    }

    /// Visible only if the entity and every ancestor are flagged visible.
    #[must_use]
    pub fn is_visible(&self, entity: EntityId) -> bool {
        let mut cursor = Some(entity);
        while let Some(current) = cursor {
            match self.entities.get(current) {
                Some(node) if node.visible => cursor = node.parent,
                _ => return false,
            }
        }
        true
    }

    /// Store (or clear) the entity's animation controller. The world keeps
    /// a shared reference only and never drives it.
    #[track_caller]
    pub fn set_animation_controller(&mut self, entity: EntityId, controller: Option<Rc<dyn Any>>) {
        self.entity_node_mut(entity).animation_controller = controller;
    }

    /// The entity's animation controller, if any.
    #[must_use]
    pub fn animation_controller(&self, entity: EntityId) -> Option<&Rc<dyn Any>> {
        self.entities
            .get(entity)
            .and_then(|node| node.animation_controller.as_ref())
    }

    // ========================================================================
    // Components
    // ========================================================================

    /// Store a component without attaching it.
    pub fn create_component<C: Component>(&mut self, component: C) -> ComponentId {
        self.create_boxed_component(Box::new(component))
    }

    /// Store an already boxed component without attaching it.
    pub fn create_boxed_component(&mut self, component: Box<dyn Component>) -> ComponentId {
        let type_name = component.as_ref().type_name();
        self.components.insert(ComponentSlot {
            component: Some(component),
            owner: None,
            type_name,
            pending: SmallVec::new(),
            doomed: false,
        })
    }

    /// Free a detached component. One that is running a hook is freed when
    /// the hook returns.
    fn release_component(&mut self, component: ComponentId) {
        match self.components.get_mut(component) {
            Some(slot) if slot.component.is_none() => slot.doomed = true,
            Some(_) => {
                self.components.remove(component);
            }
            None => {}
        }
    }

    /// Create a component and attach it to `entity` in one step.
    #[track_caller]
    pub fn attach<C: Component>(&mut self, entity: EntityId, component: C) -> ComponentId {
        let id = self.create_component(component);
        self.add_component(entity, id);
        id
    }

    /// Remove an unattached component from the world and return it.
    ///
    /// Returns `None` for a stale id, or when called from the component's own
    /// hook, in which case the component stays in the world.
    ///
    /// # Panics
    ///
    /// Panics if the component is still attached.
    #[track_caller]
    pub fn take_component(&mut self, component: ComponentId) -> Option<Box<dyn Component>> {
        let slot = self.components.get(component)?;
        if let Some(owner) = slot.owner {
            HierarchyError::ComponentStillAttached { component, owner }.raise();
        }
        slot.component.as_ref()?;
        self.components.remove(component)?.component
    }

    /// Attach a stored component to `entity`.
    ///
    /// Fires `on_added_to_entity`, then `on_added_to_scene` if the entity is
    /// live in a scene.
    ///
    /// # Panics
    ///
    /// Panics if the component is already attached or either id is stale.
    #[track_caller]
    pub fn add_component(&mut self, entity: EntityId, component: ComponentId) {
        self.entity_node(entity);
        if let Some(owner) = self.component_slot(component).owner {
            HierarchyError::ComponentAlreadyAttached { component, owner }.raise();
        }

        if let Some(slot) = self.components.get_mut(component) {
            slot.owner = Some(entity);
        }
        self.entity_node_mut(entity).components.push(component);
        log::debug!("component {component:?} attached to {entity:?}");

        self.run_hook(entity, component, Hook::AddedToEntity);
        if self.is_live(entity) && self.component_owner(component) == Some(entity) {
            self.run_hook(entity, component, Hook::AddedToScene);
        }
    }

    /// Detach a component from `entity`, keeping it alive in the world.
    ///
    /// Fires `on_removed_from_scene` if the entity is live in a scene, then
    /// `on_removed_from_entity`. Remaining components keep their order.
    ///
    /// # Panics
    ///
    /// Panics if the component is not attached to `entity`.
    #[track_caller]
    pub fn remove_component(&mut self, entity: EntityId, component: ComponentId) {
        self.entity_node(entity);
        if self.component_slot(component).owner != Some(entity) {
            HierarchyError::ComponentNotAttached { component, entity }.raise();
        }

        if self.is_live(entity) {
            self.run_hook(entity, component, Hook::RemovedFromScene);
        }
        self.run_hook(entity, component, Hook::RemovedFromEntity);

        if let Some(node) = self.entities.get_mut(entity) {
            if let Some(index) = node.components.iter().position(|&c| c == component) {
                node.components.remove(index);
            }
        }
        if let Some(slot) = self.components.get_mut(component) {
            if slot.owner == Some(entity) {
                slot.owner = None;
            }
        }
        log::debug!("component {component:?} detached from {entity:?}");
    }

    /// Detach every component of `entity` and return their ids.
    #[track_caller]
    pub fn remove_all_components(&mut self, entity: EntityId) -> Vec<ComponentId> {
        let components = self.entity_node(entity).components.clone();
        let mut detached = Vec::with_capacity(components.len());
        for component in components {
            if self.component_owner(component) == Some(entity) {
                self.remove_component(entity, component);
                detached.push(component);
            }
        }
        detached
    }

    /// Borrow a component, `None` if stale or currently running a hook.
    #[must_use]
    pub fn component(&self, component: ComponentId) -> Option<&(dyn Component + 'static)> {
        self.components
            .get(component)
            .and_then(|slot| slot.component.as_deref())
    }

    /// Mutably borrow a component.
    #[must_use]
    pub fn component_mut(&mut self, component: ComponentId) -> Option<&mut (dyn Component + 'static)> {
        self.components
            .get_mut(component)
            .and_then(|slot| slot.component.as_deref_mut())
    }

    /// Entity a component is attached to.
    #[must_use]
    pub fn component_owner(&self, component: ComponentId) -> Option<EntityId> {
        self.components.get(component).and_then(|slot| slot.owner)
    }

    /// Concrete type name of a component.
    #[must_use]
    pub fn component_type_name(&self, component: ComponentId) -> Option<&'static str> {
        self.components.get(component).map(|slot| slot.type_name)
    }

    /// Number of live components, attached or not.
    #[must_use]
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// Components attached to `entity` in attachment order.
    #[must_use]
    pub fn component_ids(&self, entity: EntityId) -> &[ComponentId] {
        self.entities
            .get(entity)
            .map(|node| node.components.as_slice())
            .unwrap_or_default()
    }

    /// Attached components that are not checked out, in attachment order.
    fn attached(
        &self,
        entity: EntityId,
    ) -> impl Iterator<Item = (ComponentId, &(dyn Component + 'static))> + '_ {
        self.component_ids(entity).iter().filter_map(move |&id| {
            self.components
                .get(id)
                .and_then(|slot| slot.component.as_deref())
                .map(|component| (id, component))
        })
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    /// First component on `entity` answering for `capability` whose mask
    /// passes `mask`.
    #[must_use]
    pub fn get_component_id(
        &self,
        entity: EntityId,
        capability: Capability,
        mask: QueryMask,
    ) -> Option<ComponentId> {
        self.attached(entity)
            .find(|(_, c)| mask_matches(mask, c.query_mask()) && c.is_a(capability))
            .map(|(id, _)| id)
    }

    /// Like [`get_component_id`](Self::get_component_id), searching the
    /// subtree depth-first starting with `entity`.
    #[must_use]
    pub fn get_component_id_recursive(
        &self,
        entity: EntityId,
        capability: Capability,
        mask: QueryMask,
    ) -> Option<ComponentId> {
        self.subtree(entity)
            .find_map(|e| self.get_component_id(e, capability, mask))
    }

    /// First component of type `T` on `entity`.
    #[must_use]
    pub fn get_component<T: Component>(&self, entity: EntityId) -> Option<&T> {
        self.get_component_with_mask(entity, 0)
    }

    /// First component of type `T` on `entity` whose mask passes `mask`.
    #[must_use]
    pub fn get_component_with_mask<T: Component>(&self, entity: EntityId, mask: QueryMask) -> Option<&T> {
        let capability = Capability::of::<T>();
        self.attached(entity)
            .filter(|(_, c)| mask_matches(mask, c.query_mask()) && c.is_a(capability))
            .find_map(|(_, c)| c.downcast_ref::<T>())
    }

    /// First component of type `T` on `entity`, mutably.
    #[must_use]
    pub fn get_component_mut<T: Component>(&mut self, entity: EntityId) -> Option<&mut T> {
        let capability = Capability::of::<T>();
        let id = self
            .attached(entity)
            .find(|(_, c)| c.is_a(capability) && c.is::<T>())
            .map(|(id, _)| id)?;
        self.component_mut(id)?.downcast_mut::<T>()
    }

    /// Every component of type `T` on `entity`.
    #[must_use]
    pub fn get_components<T: Component>(&self, entity: EntityId) -> Vec<&T> {
        let capability = Capability::of::<T>();
        self.attached(entity)
            .filter(|(_, c)| c.is_a(capability))
            .filter_map(|(_, c)| c.downcast_ref::<T>())
            .collect()
    }

    /// First component of type `T` on `entity` or, failing that, on its
    /// descendants in depth-first order.
    #[must_use]
    pub fn get_component_recursive<T: Component>(&self, entity: EntityId) -> Option<&T> {
        self.subtree(entity).find_map(|e| self.get_component::<T>(e))
    }

    /// Every component of type `T` in the subtree, depth-first.
    #[must_use]
    pub fn get_components_recursive<T: Component>(&self, entity: EntityId) -> Vec<&T> {
        self.subtree(entity)
            .flat_map(|e| self.get_components::<T>(e))
            .collect()
    }

    // ========================================================================
    // Ticking
    // ========================================================================

    /// Tick the entity's components in attachment order, then its children,
    /// depth-first.
    ///
    /// Entries detached by a hook during the tick are skipped.
    #[track_caller]
    pub fn update(&mut self, entity: EntityId, dt: f32) {
        self.entity_node(entity);
        self.tick(entity, Hook::Update(dt));
    }

    /// Fixed-step variant of [`update`](Self::update).
    #[track_caller]
    pub fn fixed_update(&mut self, entity: EntityId, dt: f32) {
        self.entity_node(entity);
        self.tick(entity, Hook::FixedUpdate(dt));
    }

    pub(crate) fn tick(&mut self, entity: EntityId, hook: Hook) {
        let Some(node) = self.entities.get(entity) else {
            return;
        };
        let components = node.components.clone();
        let children = node.children.snapshot();

        for component in components {
            if self.component_owner(component) == Some(entity) {
                self.run_hook(entity, component, hook);
            }
        }
        for child in children {
            if self.parent(child) == Some(entity) {
                self.tick(child, hook);
            }
        }
    }

    /// Check the component out of its slot, run the hook, and put it back.
    ///
    /// Lifecycle hooks aimed at a component that is already checked out are
    /// queued on its slot and delivered here, in arrival order, before the
    /// component goes back. Re-entrant ticks are dropped. A component
    /// destroyed while checked out is freed once its queue drains.
    pub(crate) fn run_hook(&mut self, entity: EntityId, component: ComponentId, hook: Hook) {
        let Some(slot) = self.components.get_mut(component) else {
            return;
        };
        let Some(mut checked_out) = slot.component.take() else {
            if hook.is_lifecycle() {
                log::trace!("queued {hook:?} for busy component {component:?}");
                slot.pending.push((entity, hook));
            }
            return;
        };

        self.dispatch(checked_out.as_mut(), ComponentContext { entity, component }, hook);

        loop {
            let Some(slot) = self.components.get_mut(component) else {
                log::debug!("component {component:?} vanished during its own {hook:?} hook");
                return;
            };
            if !slot.pending.is_empty() {
                let (entity, queued) = slot.pending.remove(0);
                self.dispatch(checked_out.as_mut(), ComponentContext { entity, component }, queued);
                continue;
            }
            if slot.doomed && slot.owner.is_none() {
                self.components.remove(component);
                log::debug!("component {component:?} destroyed during its own {hook:?} hook");
            } else {
                slot.doomed = false;
                slot.component = Some(checked_out);
            }
            return;
        }
    }

    fn dispatch(&mut self, component: &mut dyn Component, ctx: ComponentContext, hook: Hook) {
        match hook {
            Hook::AddedToEntity => component.on_added_to_entity(self, ctx),
            Hook::RemovedFromEntity => component.on_removed_from_entity(self, ctx),
            Hook::AddedToScene => component.on_added_to_scene(self, ctx),
            Hook::RemovedFromScene => component.on_removed_from_scene(self, ctx),
            Hook::Update(dt) => component.on_update(self, ctx, dt),
            Hook::FixedUpdate(dt) => component.on_fixed_update(self, ctx, dt),
        }
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("entities", &self.entities.len())
            .field("components", &self.components.len())
            .field("transforms", &self.transforms.len())
            .field("scenes", &self.scenes.len())
            .finish()
    }
}
