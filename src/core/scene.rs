//! Scene registry
//!
//! A scene owns an ordered list of root entities and drives their per-frame
//! ticks. Registering a root is what makes its subtree enter the scene and
//! fire `on_added_to_scene`; removing it fires `on_removed_from_scene`.

use slotmap::new_key_type;

use crate::core::error::HierarchyError;
use crate::ecs::world::Hook;
use crate::ecs::{EntityId, World};

new_key_type! {
    /// Generation-checked handle to a scene.
    pub struct SceneId;
}

/// A named list of root entities
#[derive(Debug, Clone, Default)]
pub struct Scene {
    name: String,
    roots: Vec<EntityId>,
}

impl Scene {
    /// Scene name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Root entities in registration order
    #[must_use]
    pub fn roots(&self) -> &[EntityId] {
        &self.roots
    }
}

impl World {
    #[track_caller]
    fn scene_mut(&mut self, scene: SceneId) -> &mut Scene {
        match self.scenes.get_mut(scene) {
            Some(s) => s,
            None => HierarchyError::StaleScene(scene).raise(),
        }
    }

    /// Create an empty scene.
    pub fn create_scene(&mut self, name: impl Into<String>) -> SceneId {
        let name = name.into();
        log::debug!("created scene {name:?}");
        self.scenes.insert(Scene {
            name,
            roots: Vec::new(),
        })
    }

    /// Remove every root from the scene, then drop the scene.
    ///
    /// The former roots stay alive as detached entities and are returned.
    #[track_caller]
    pub fn destroy_scene(&mut self, scene: SceneId) -> Vec<EntityId> {
        let roots = self.scene_mut(scene).roots.clone();
        for &root in &roots {
            if self.scene_of(root) == Some(scene) && self.parent(root).is_none() {
                self.remove_from_scene(root);
            }
        }
        if let Some(removed) = self.scenes.remove(scene) {
            log::debug!("destroyed scene {:?}", removed.name);
        }
        roots
    }

    /// Look up a scene.
    #[must_use]
    pub fn scene(&self, scene: SceneId) -> Option<&Scene> {
        self.scenes.get(scene)
    }

    /// Root entities of a scene, empty for a stale id.
    #[must_use]
    pub fn scene_roots(&self, scene: SceneId) -> &[EntityId] {
        self.scenes
            .get(scene)
            .map(|s| s.roots.as_slice())
            .unwrap_or_default()
    }

    /// Number of live scenes.
    #[must_use]
    pub fn scene_count(&self) -> usize {
        self.scenes.len()
    }

    /// Register a detached entity as a root of `scene`.
    ///
    /// Every entity in its subtree receives the scene reference first, then
    /// `on_added_to_scene` fires depth-first, components before children.
    ///
    /// # Panics
    ///
    /// Panics if the entity has a parent or already belongs to a scene.
    #[track_caller]
    pub fn add_to_scene(&mut self, scene: SceneId, root: EntityId) {
        let node = self.entity_node(root);
        if let Some(parent) = node.parent {
            HierarchyError::AlreadyParented {
                child: root,
                parent,
            }
            .raise();
        }
        if let Some(existing) = node.scene {
            HierarchyError::AlreadyInScene {
                entity: root,
                scene: existing,
            }
            .raise();
        }

        self.scene_mut(scene).roots.push(root);
        log::debug!("entity {root:?} added to scene {scene:?} as a root");
        self.enter_scene(root, scene, true);
    }

    /// Unregister a root entity from its scene.
    ///
    /// `on_removed_from_scene` fires children first while the subtree is
    /// still attached, then the scene references are cleared.
    ///
    /// # Panics
    ///
    /// Panics if the entity is not a root of a scene.
    #[track_caller]
    pub fn remove_from_scene(&mut self, root: EntityId) {
        let node = self.entity_node(root);
        let scene = match (node.parent, node.scene) {
            (None, Some(scene)) => scene,
            _ => HierarchyError::NotASceneRoot(root).raise(),
        };

        self.leave_scene(root);

        if let Some(s) = self.scenes.get_mut(scene) {
            if let Some(index) = s.roots.iter().position(|&r| r == root) {
                s.roots.remove(index);
            }
        }
        log::debug!("entity {root:?} removed from scene {scene:?}");
    }

    /// Tick every root of the scene in registration order.
    #[track_caller]
    pub fn update_scene(&mut self, scene: SceneId, dt: f32) {
        self.tick_scene(scene, Hook::Update(dt));
    }

    /// Fixed-step tick of every root in registration order.
    #[track_caller]
    pub fn fixed_update_scene(&mut self, scene: SceneId, dt: f32) {
        self.tick_scene(scene, Hook::FixedUpdate(dt));
    }

    #[track_caller]
    fn tick_scene(&mut self, scene: SceneId, hook: Hook) {
        let roots = self.scene_mut(scene).roots.clone();
        for root in roots {
            if self.scene_of(root) == Some(scene) && self.parent(root).is_none() {
                self.tick(root, hook);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::ComponentContext;
    use crate::ecs::Component;
    use crate::ecs::test_support::{LifecycleLog, Recorder};

    /// Spawns a child beneath its own entity when entering a scene.
    struct Spawner;
    impl Component for Spawner {
        fn on_added_to_scene(&mut self, world: &mut World, ctx: ComponentContext) {
            let child = world.create_named_entity("spawned");
            world.add_child(ctx.entity, child);
        }
    }

    /// Removes its entity from the scene on the first update.
    struct Quitter;
    impl Component for Quitter {
        fn on_update(&mut self, world: &mut World, ctx: ComponentContext, _dt: f32) {
            world.remove_from_parent(ctx.entity);
        }
    }

    #[test]
    fn test_scene_root_and_child_enter_once_components_first() {
        let log = LifecycleLog::default();
        let mut world = World::new();
        let scene = world.create_scene("level");
        let root = world.create_entity();
        let child = world.create_entity();
        world.attach(root, Recorder::new("root", &log));
        world.add_child(root, child);
        world.attach(child, Recorder::new("child", &log));
        log.clear();

        world.add_to_scene(scene, root);

        assert_eq!(log.entries(), vec!["root:added_to_scene", "child:added_to_scene"]);
        assert_eq!(world.scene_of(root), Some(scene));
        assert_eq!(world.scene_of(child), Some(scene));
        assert_eq!(world.scene_roots(scene), &[root]);
    }

    #[test]
    fn test_component_sees_entity_before_scene() {
        let log = LifecycleLog::default();
        let mut world = World::new();
        let scene = world.create_scene("level");
        let entity = world.create_entity();

        world.attach(entity, Recorder::new("x", &log));
        assert_eq!(log.entries(), vec!["x:added_to_entity"]);

        world.add_to_scene(scene, entity);
        assert_eq!(log.entries(), vec!["x:added_to_entity", "x:added_to_scene"]);
    }

    #[test]
    fn test_component_added_to_live_entity_gets_both_hooks() {
        let log = LifecycleLog::default();
        let mut world = World::new();
        let scene = world.create_scene("level");
        let entity = world.create_entity();
        world.add_to_scene(scene, entity);

        let component = world.attach(entity, Recorder::new("x", &log));
        world.remove_component(entity, component);

        assert_eq!(
            log.entries(),
            vec![
                "x:added_to_entity",
                "x:added_to_scene",
                "x:removed_from_scene",
                "x:removed_from_entity",
            ]
        );
    }

    #[test]
    fn test_remove_from_scene_children_before_components() {
        let log = LifecycleLog::default();
        let mut world = World::new();
        let scene = world.create_scene("level");
        let root = world.create_entity();
        let child = world.create_entity();
        world.attach(root, Recorder::new("root", &log));
        world.attach(child, Recorder::new("child", &log));
        world.add_child(root, child);
        world.add_to_scene(scene, root);
        log.clear();

        world.remove_from_scene(root);

        assert_eq!(log.entries(), vec!["child:removed_from_scene", "root:removed_from_scene"]);
        assert_eq!(world.scene_of(root), None);
        assert_eq!(world.scene_of(child), None);
        assert!(world.scene_roots(scene).is_empty());
    }

    #[test]
    fn test_remove_from_parent_on_root_leaves_scene() {
        let mut world = World::new();
        let scene = world.create_scene("level");
        let root = world.create_entity();
        world.add_to_scene(scene, root);

        world.remove_from_parent(root);

        assert_eq!(world.scene_of(root), None);
        assert!(world.scene_roots(scene).is_empty());
    }

    #[test]
    fn test_hook_adding_child_during_cascade_fires_once() {
        let log = LifecycleLog::default();
        let mut world = World::new();
        let scene = world.create_scene("level");
        let root = world.create_entity();
        world.attach(root, Spawner);
        world.attach(root, Recorder::new("root", &log));

        world.add_to_scene(scene, root);

        let spawned = world.immediate_child_with_name(root, "spawned");
        assert!(spawned.is_some_and(|e| world.is_live(e)));
        assert_eq!(world.scene_of(spawned.unwrap_or(root)), Some(scene));
        assert_eq!(
            log.entries().iter().filter(|e| e.ends_with("added_to_scene")).count(),
            1
        );
    }

    #[test]
    #[should_panic(expected = "is already in scene")]
    fn test_adding_scene_member_to_scene_panics() {
        let mut world = World::new();
        let first = world.create_scene("a");
        let second = world.create_scene("b");
        let root = world.create_entity();
        world.add_to_scene(first, root);
        world.add_to_scene(second, root);
    }

    #[test]
    #[should_panic(expected = "is already a child of")]
    fn test_adding_child_entity_to_scene_panics() {
        let mut world = World::new();
        let scene = world.create_scene("level");
        let parent = world.create_entity();
        let child = world.create_entity();
        world.add_child(parent, child);
        world.add_to_scene(scene, child);
    }

    #[test]
    #[should_panic(expected = "is already in scene")]
    fn test_adding_scene_root_as_child_panics() {
        let mut world = World::new();
        let scene = world.create_scene("level");
        let parent = world.create_entity();
        let root = world.create_entity();
        world.add_to_scene(scene, root);
        world.add_child(parent, root);
    }

    #[test]
    #[should_panic(expected = "is not a scene root")]
    fn test_remove_non_root_from_scene_panics() {
        let mut world = World::new();
        let lonely = world.create_entity();
        world.remove_from_scene(lonely);
    }

    #[test]
    fn test_update_scene_ticks_roots_in_order() {
        let log = LifecycleLog::default();
        let mut world = World::new();
        let scene = world.create_scene("level");
        let first = world.create_entity();
        let second = world.create_entity();
        world.attach(first, Recorder::new("first", &log));
        world.attach(second, Recorder::new("second", &log));
        world.add_to_scene(scene, first);
        world.add_to_scene(scene, second);
        log.clear();

        world.update_scene(scene, 0.016);
        world.fixed_update_scene(scene, 0.02);

        assert_eq!(
            log.entries(),
            vec![
                "first:update",
                "second:update",
                "first:fixed_update",
                "second:fixed_update",
            ]
        );
    }

    #[test]
    fn test_root_leaving_scene_during_update() {
        let log = LifecycleLog::default();
        let mut world = World::new();
        let scene = world.create_scene("level");
        let quitter = world.create_entity();
        let stayer = world.create_entity();
        world.attach(quitter, Quitter);
        world.attach(stayer, Recorder::new("stayer", &log));
        world.add_to_scene(scene, quitter);
        world.add_to_scene(scene, stayer);
        log.clear();

        world.update_scene(scene, 0.016);

        assert_eq!(world.scene_roots(scene), &[stayer]);
        assert_eq!(log.entries(), vec!["stayer:update"]);
    }

    #[test]
    fn test_destroy_scene_detaches_roots() {
        let log = LifecycleLog::default();
        let mut world = World::new();
        let scene = world.create_scene("level");
        let root = world.create_entity();
        world.attach(root, Recorder::new("root", &log));
        world.add_to_scene(scene, root);
        log.clear();

        let roots = world.destroy_scene(scene);

        assert_eq!(roots, vec![root]);
        assert!(world.contains_entity(root));
        assert_eq!(world.scene_of(root), None);
        assert!(world.scene(scene).is_none());
        assert_eq!(log.entries(), vec!["root:removed_from_scene"]);
    }
}
