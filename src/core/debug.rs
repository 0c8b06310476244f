//! Debug and statistics module

use glam::{Quat, Vec3};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::ecs::{EntityId, World};

/// Hierarchy statistics
#[derive(Debug, Clone, Default)]
pub struct HierarchyStats {
    /// Live entities
    pub entities: usize,
    /// Entities without a parent
    pub roots: usize,
    /// Live scenes
    pub scenes: usize,
    /// Live components, attached or not
    pub components: usize,
    /// Components not attached to any entity
    pub detached_components: usize,
    /// Live transforms
    pub transforms: usize,
    /// Deepest ancestor chain (roots are depth 0)
    pub max_depth: usize,
    /// Component count per concrete type
    pub components_by_type: FxHashMap<&'static str, usize>,
}

impl HierarchyStats {
    /// Get a formatted stats string
    pub fn format_stats(&self) -> String {
        format!(
            "Entities: {} (roots: {}, max depth: {}) | Components: {} (detached: {}) | Transforms: {} | Scenes: {}",
            self.entities,
            self.roots,
            self.max_depth,
            self.components,
            self.detached_components,
            self.transforms,
            self.scenes
        )
    }
}

/// Serializable dump of an entity subtree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    /// Entity name
    pub name: String,
    /// Own visibility flag
    pub visible: bool,
    /// Local position
    pub position: Vec3,
    /// Local scale
    pub scale: Vec3,
    /// Local orientation
    pub orientation: Quat,
    /// Local opacity
    pub opacity: f32,
    /// Short type names of attached components, in attachment order
    pub components: Vec<String>,
    /// Child snapshots in collection order
    pub children: Vec<EntitySnapshot>,
}

impl EntitySnapshot {
    /// Pretty-printed JSON
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn short_type_name(name: &str) -> &str {
    name.rsplit("::").next().unwrap_or(name)
}

impl World {
    /// Gather hierarchy statistics
    #[must_use]
    pub fn stats(&self) -> HierarchyStats {
        let mut stats = HierarchyStats {
            entities: self.entities.len(),
            scenes: self.scenes.len(),
            components: self.components.len(),
            transforms: self.transforms.len(),
            ..HierarchyStats::default()
        };

        for (id, node) in &self.entities {
            if node.parent.is_none() {
                stats.roots += 1;
            }
            stats.max_depth = stats.max_depth.max(self.depth(id));
        }
        for slot in self.components.values() {
            if slot.owner.is_none() {
                stats.detached_components += 1;
            }
            *stats.components_by_type.entry(slot.type_name).or_insert(0) += 1;
        }

        stats
    }

    /// Snapshot an entity and its subtree, `None` for a stale id
    #[must_use]
    pub fn snapshot(&self, entity: EntityId) -> Option<EntitySnapshot> {
        let node = self.entities.get(entity)?;
        let transform = self.transforms.get(node.transform)?;
        Some(EntitySnapshot {
            name: node.name.clone(),
            visible: node.visible,
            position: transform.position(),
            scale: transform.scale(),
            orientation: transform.orientation(),
            opacity: transform.opacity(),
            components: node
                .components
                .iter()
                .filter_map(|&c| self.component_type_name(c))
                .map(|name| short_type_name(name).to_string())
                .collect(),
            children: node
                .children
                .iter()
                .filter_map(|&child| self.snapshot(child))
                .collect(),
        })
    }

    /// JSON dump of an entity subtree (`null` for a stale id)
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails
    pub fn to_json(&self, entity: EntityId) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.snapshot(entity))
    }
}
