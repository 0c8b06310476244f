//! Spatial Transforms with Lazily Cached Matrices
//!
//! Every transform owns its local state (position, scale, orientation,
//! opacity) and two caches: the local matrix and the world matrix. Both are
//! guarded by dirty flags and rebuilt on read, so mutating a transform is
//! always O(1) and the cost of composition is paid only where a world matrix
//! is actually consumed.
//!
//! # Lazy Invalidation
//!
//! Mutating a transform does not touch the caches of its descendants.
//! Instead each transform carries a `world_revision` that is bumped whenever
//! its world cache is rewritten, and each child remembers the parent revision
//! it composed against. Reading a world matrix walks the ancestor chain from
//! the root down and rebuilds exactly those nodes whose own flag is down or
//! whose parent moved on to a newer revision.
//!
//! Re-parenting is the one eager case: linking or unlinking a child
//! invalidates that child's world cache immediately.
//!
//! The changed event is not lazy. A mutation fires it on the transform and
//! then on every descendant, since their world state went stale with it.
//!
//! # Example
//!
//! ```ignore
//! let mut store = TransformStore::new();
//! let parent = store.create();
//! let child = store.create();
//! store.add_child(parent, child);
//!
//! store.set_position(parent, Vec3::new(10.0, 0.0, 0.0));
//! store.set_position(child, Vec3::new(1.0, 0.0, 0.0));
//!
//! assert_eq!(store.world_position(child), Vec3::new(11.0, 0.0, 0.0));
//! ```
//!
//! # Conventions
//!
//! glam matrices act on column vectors, so composition reads
//! `world = parent_world * local`.

use std::cell::Cell;

use glam::{EulerRot, Mat4, Quat, Vec3};
use slotmap::{SlotMap, new_key_type};
use smallvec::SmallVec;

use crate::core::error::HierarchyError;
use crate::core::events::TransformChangedEvent;

new_key_type! {
    /// Generation-checked handle to a transform in a [`TransformStore`].
    pub struct TransformId;
}

/// Ancestor chains up to this depth are resolved without allocating.
type Chain<'a> = SmallVec<[&'a Transform; 16]>;

// ============================================================================
// Transform
// ============================================================================

/// Local spatial state of one node plus its cached matrices.
///
/// Transforms live in a [`TransformStore`]; all mutation goes through the
/// store so that linkage and change notification stay consistent.
#[derive(Debug)]
pub struct Transform {
    position: Vec3,
    scale: Vec3,
    orientation: Quat,
    opacity: f32,

    local_matrix: Cell<Mat4>,
    world_matrix: Cell<Mat4>,
    world_opacity: Cell<f32>,
    local_valid: Cell<bool>,
    world_valid: Cell<bool>,
    /// Bumped every time the world cache is rewritten
    world_revision: Cell<u64>,
    /// Parent revision the world cache was composed against
    parent_revision: Cell<u64>,
    recompute_count: Cell<u64>,

    parent: Option<TransformId>,
    children: SmallVec<[TransformId; 8]>,
    changed: TransformChangedEvent,
}

impl Transform {
    fn new() -> Self {
        Self {
            position: Vec3::ZERO,
            scale: Vec3::ONE,
            orientation: Quat::IDENTITY,
            opacity: 1.0,
            local_matrix: Cell::new(Mat4::IDENTITY),
            world_matrix: Cell::new(Mat4::IDENTITY),
            world_opacity: Cell::new(1.0),
            local_valid: Cell::new(false),
            world_valid: Cell::new(false),
            world_revision: Cell::new(0),
            parent_revision: Cell::new(0),
            recompute_count: Cell::new(0),
            parent: None,
            children: SmallVec::new(),
            changed: TransformChangedEvent::new(),
        }
    }

    // -------------------------------------------------------------------------
    // Local state
    // -------------------------------------------------------------------------

    /// Position relative to the parent.
    #[must_use]
    #[inline]
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Scale relative to the parent.
    #[must_use]
    #[inline]
    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    /// Orientation relative to the parent.
    #[must_use]
    #[inline]
    pub fn orientation(&self) -> Quat {
        self.orientation
    }

    /// Opacity before multiplying in the parent's.
    #[must_use]
    #[inline]
    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    /// Get the forward direction (negative Z in local space).
    #[must_use]
    #[inline]
    pub fn forward(&self) -> Vec3 {
        self.orientation * Vec3::NEG_Z
    }

    /// Get the right direction (positive X in local space).
    #[must_use]
    #[inline]
    pub fn right(&self) -> Vec3 {
        self.orientation * Vec3::X
    }

    /// Get the up direction (positive Y in local space).
    #[must_use]
    #[inline]
    pub fn up(&self) -> Vec3 {
        self.orientation * Vec3::Y
    }

    /// Parent transform, if linked.
    #[must_use]
    #[inline]
    pub fn parent(&self) -> Option<TransformId> {
        self.parent
    }

    /// Linked child transforms in link order.
    #[must_use]
    #[inline]
    pub fn children(&self) -> &[TransformId] {
        &self.children
    }

    // -------------------------------------------------------------------------
    // Caches
    // -------------------------------------------------------------------------

    /// Local matrix, rebuilt from the local state if dirty.
    #[must_use]
    pub fn local_matrix(&self) -> Mat4 {
        if !self.local_valid.get() {
            self.local_matrix.set(Mat4::from_scale_rotation_translation(
                self.scale,
                self.orientation,
                self.position,
            ));
            self.local_valid.set(true);
        }
        self.local_matrix.get()
    }

    /// Whether the local matrix cache is current.
    #[must_use]
    #[inline]
    pub fn is_local_valid(&self) -> bool {
        self.local_valid.get()
    }

    /// Rebuild the world cache if this node is dirty or its parent moved on.
    ///
    /// `parent` must already be resolved.
    fn refresh_world(&self, parent: Option<&Transform>) {
        let parent_revision = parent.map_or(0, |p| p.world_revision.get());
        if self.world_valid.get() && self.parent_revision.get() == parent_revision {
            return;
        }

        let local = self.local_matrix();
        let (world, opacity) = match parent {
            Some(p) => (p.world_matrix.get() * local, p.world_opacity.get() * self.opacity),
            None => (local, self.opacity),
        };

        self.world_matrix.set(world);
        self.world_opacity.set(opacity);
        self.parent_revision.set(parent_revision);
        self.world_valid.set(true);
        self.world_revision.set(self.world_revision.get() + 1);
        self.recompute_count.set(self.recompute_count.get() + 1);
        log::trace!("world cache rebuilt (revision {})", self.world_revision.get());
    }

    fn reset_state(&mut self) {
        self.position = Vec3::ZERO;
        self.scale = Vec3::ONE;
        self.orientation = Quat::IDENTITY;
        self.opacity = 1.0;
        self.local_matrix.set(Mat4::IDENTITY);
        self.local_valid.set(true);
        self.world_matrix.set(Mat4::IDENTITY);
        self.world_opacity.set(1.0);
        self.parent_revision.set(0);
        self.world_valid.set(true);
        self.world_revision.set(self.world_revision.get() + 1);
    }
}

fn normalized(orientation: Quat) -> Quat {
    if orientation.length_squared() > f32::EPSILON {
        orientation.normalize()
    } else {
        orientation
    }
}

// ============================================================================
// Transform Store
// ============================================================================

/// Arena owning every transform and the links between them.
///
/// Parent and child links are plain ids: a transform never owns its parent or
/// its children, and destroying one unlinks it from both sides.
#[derive(Debug, Default)]
pub struct TransformStore {
    nodes: SlotMap<TransformId, Transform>,
    normalize_orientation: bool,
}

impl TransformStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with pre-allocated capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: SlotMap::with_capacity_and_key(capacity),
            normalize_orientation: false,
        }
    }

    /// Normalize every orientation written from now on.
    pub fn set_normalize_orientation(&mut self, normalize: bool) {
        self.normalize_orientation = normalize;
    }

    /// Whether written orientations are normalized.
    #[must_use]
    pub fn normalizes_orientation(&self) -> bool {
        self.normalize_orientation
    }

    // -------------------------------------------------------------------------
    // Lifetime
    // -------------------------------------------------------------------------

    /// Create an identity transform with no links.
    pub fn create(&mut self) -> TransformId {
        self.nodes.insert(Transform::new())
    }

    /// Destroy a transform, unlinking it from its parent and children first.
    ///
    /// Returns `false` if the id was already stale.
    pub fn destroy(&mut self, id: TransformId) -> bool {
        let Some(parent) = self.nodes.get(id).map(|node| node.parent) else {
            return false;
        };
        if let Some(parent) = parent {
            self.remove_child(parent, id);
        }
        self.remove_all_children(id);
        self.nodes.remove(id).is_some()
    }

    /// Whether the id refers to a live transform.
    #[must_use]
    #[inline]
    pub fn contains(&self, id: TransformId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Number of live transforms.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the store holds no transforms.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Borrow a transform's local state.
    #[must_use]
    pub fn get(&self, id: TransformId) -> Option<&Transform> {
        self.nodes.get(id)
    }

    #[track_caller]
    fn node(&self, id: TransformId) -> &Transform {
        match self.nodes.get(id) {
            Some(node) => node,
            None => HierarchyError::StaleTransform(id).raise(),
        }
    }

    #[track_caller]
    fn node_mut(&mut self, id: TransformId) -> &mut Transform {
        match self.nodes.get_mut(id) {
            Some(node) => node,
            None => HierarchyError::StaleTransform(id).raise(),
        }
    }

    // -------------------------------------------------------------------------
    // Mutation (invalidates caches, fires the changed event)
    // -------------------------------------------------------------------------

    #[track_caller]
    fn modify(&mut self, id: TransformId, apply: impl FnOnce(&mut Transform)) {
        let normalize = self.normalize_orientation;
        let node = self.node_mut(id);
        apply(node);
        if normalize {
            node.orientation = normalized(node.orientation);
        }
        node.local_valid.set(false);
        node.world_valid.set(false);
        self.notify_subtree(id);
    }

    /// Set the position relative to the parent.
    #[track_caller]
    pub fn set_position(&mut self, id: TransformId, position: Vec3) {
        self.modify(id, |t| t.position = position);
    }

    /// Set the scale relative to the parent.
    #[track_caller]
    pub fn set_scale(&mut self, id: TransformId, scale: Vec3) {
        self.modify(id, |t| t.scale = scale);
    }

    /// Set the orientation relative to the parent. The quaternion is stored
    /// as given unless normalization is enabled.
    #[track_caller]
    pub fn set_orientation(&mut self, id: TransformId, orientation: Quat) {
        self.modify(id, |t| t.orientation = orientation);
    }

    /// Set the local opacity.
    #[track_caller]
    pub fn set_opacity(&mut self, id: TransformId, opacity: f32) {
        self.modify(id, |t| t.opacity = opacity);
    }

    /// Set position, scale and orientation in one invalidation.
    #[track_caller]
    pub fn set_position_scale_orientation(
        &mut self,
        id: TransformId,
        position: Vec3,
        scale: Vec3,
        orientation: Quat,
    ) {
        self.modify(id, |t| {
            t.position = position;
            t.scale = scale;
            t.orientation = orientation;
        });
    }

    /// Place the transform at `position` facing `target`, keeping its scale.
    #[track_caller]
    pub fn set_look_at(&mut self, id: TransformId, position: Vec3, target: Vec3, up: Vec3) {
        let orientation = Quat::from_mat4(&Mat4::look_at_rh(position, target, up)).inverse();
        self.modify(id, |t| {
            t.position = position;
            t.orientation = orientation;
        });
    }

    /// Translate by a delta.
    #[track_caller]
    pub fn move_by(&mut self, id: TransformId, delta: Vec3) {
        self.modify(id, |t| t.position += delta);
    }

    /// Rotate about a local axis by `angle` radians.
    #[track_caller]
    pub fn rotate_by(&mut self, id: TransformId, axis: Vec3, angle: f32) {
        self.modify(id, |t| t.orientation *= Quat::from_axis_angle(axis, angle));
    }

    /// Rotate about the X axis by `angle` radians.
    #[track_caller]
    pub fn rotate_x_by(&mut self, id: TransformId, angle: f32) {
        self.rotate_by(id, Vec3::X, angle);
    }

    /// Rotate about the Y axis by `angle` radians.
    #[track_caller]
    pub fn rotate_y_by(&mut self, id: TransformId, angle: f32) {
        self.rotate_by(id, Vec3::Y, angle);
    }

    /// Rotate about the Z axis by `angle` radians.
    #[track_caller]
    pub fn rotate_z_by(&mut self, id: TransformId, angle: f32) {
        self.rotate_by(id, Vec3::Z, angle);
    }

    /// Replace the orientation with a rotation of `angle` radians about `axis`.
    #[track_caller]
    pub fn rotate_to(&mut self, id: TransformId, axis: Vec3, angle: f32) {
        self.modify(id, |t| t.orientation = Quat::from_axis_angle(axis, angle));
    }

    /// Rotate by euler angles (in radians).
    #[track_caller]
    pub fn rotate_euler(&mut self, id: TransformId, euler: Vec3) {
        let rotation = Quat::from_euler(EulerRot::XYZ, euler.x, euler.y, euler.z);
        self.modify(id, |t| t.orientation = rotation * t.orientation);
    }

    /// Multiply the scale per axis.
    #[track_caller]
    pub fn scale_by(&mut self, id: TransformId, factor: Vec3) {
        self.modify(id, |t| t.scale *= factor);
    }

    /// Multiply the scale uniformly.
    #[track_caller]
    pub fn scale_uniform_by(&mut self, id: TransformId, factor: f32) {
        self.modify(id, |t| t.scale *= factor);
    }

    /// Replace the scale.
    #[track_caller]
    pub fn scale_to(&mut self, id: TransformId, scale: Vec3) {
        self.set_scale(id, scale);
    }

    /// Overwrite the local state from a matrix.
    ///
    /// The matrix is decomposed into translation, rotation and scale; any
    /// shear is lost.
    #[track_caller]
    pub fn set_local_transform(&mut self, id: TransformId, matrix: Mat4) {
        let (scale, orientation, position) = matrix.to_scale_rotation_translation();
        self.set_position_scale_orientation(id, position, scale, orientation);
    }

    /// Overwrite the transform so that its world matrix becomes `world`.
    ///
    /// The local state is solved against the current parent's world matrix,
    /// so the result holds regardless of where the transform is linked. Any
    /// shear in the solved local matrix is dropped by the decomposition, and
    /// both caches are seeded from the decomposed state so they always agree
    /// with it.
    #[track_caller]
    pub fn set_world_transform(&mut self, id: TransformId, world: Mat4) {
        let (parent_world, parent_opacity, parent_revision) = match self.node(id).parent {
            Some(parent) => {
                let parent = self.resolve(parent);
                (
                    parent.world_matrix.get(),
                    parent.world_opacity.get(),
                    parent.world_revision.get(),
                )
            }
            None => (Mat4::IDENTITY, 1.0, 0),
        };

        let (scale, orientation, position) =
            (parent_world.inverse() * world).to_scale_rotation_translation();
        let orientation = if self.normalize_orientation {
            normalized(orientation)
        } else {
            orientation
        };
        let local = Mat4::from_scale_rotation_translation(scale, orientation, position);

        let node = self.node_mut(id);
        node.position = position;
        node.scale = scale;
        node.orientation = orientation;
        node.local_matrix.set(local);
        node.local_valid.set(true);
        node.world_matrix.set(parent_world * local);
        node.world_opacity.set(parent_opacity * node.opacity);
        node.parent_revision.set(parent_revision);
        node.world_valid.set(true);
        node.world_revision.set(node.world_revision.get() + 1);
        self.notify_subtree(id);
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Collect `id` and its ancestors, leaf first.
    #[track_caller]
    fn chain(&self, id: TransformId) -> Chain<'_> {
        let mut chain = Chain::new();
        let mut node = self.node(id);
        chain.push(node);
        while let Some(parent) = node.parent {
            node = self.node(parent);
            chain.push(node);
        }
        chain
    }

    /// Bring the world cache of `id` up to date, resolving ancestors first.
    #[track_caller]
    fn resolve(&self, id: TransformId) -> &Transform {
        let chain = self.chain(id);
        let mut parent: Option<&Transform> = None;
        for &node in chain.iter().rev() {
            node.refresh_world(parent);
            parent = Some(node);
        }
        chain[0]
    }

    /// Local position.
    #[must_use]
    #[track_caller]
    pub fn local_position(&self, id: TransformId) -> Vec3 {
        self.node(id).position
    }

    /// Local scale.
    #[must_use]
    #[track_caller]
    pub fn local_scale(&self, id: TransformId) -> Vec3 {
        self.node(id).scale
    }

    /// Local orientation.
    #[must_use]
    #[track_caller]
    pub fn local_orientation(&self, id: TransformId) -> Quat {
        self.node(id).orientation
    }

    /// Local opacity.
    #[must_use]
    #[track_caller]
    pub fn local_opacity(&self, id: TransformId) -> f32 {
        self.node(id).opacity
    }

    /// Local matrix, rebuilt if dirty.
    #[must_use]
    #[track_caller]
    pub fn local_matrix(&self, id: TransformId) -> Mat4 {
        self.node(id).local_matrix()
    }

    /// World matrix, rebuilding this node and any stale ancestors first.
    ///
    /// After this returns the node's caches stay valid until it or one of its
    /// ancestors is mutated or re-linked.
    #[must_use]
    #[track_caller]
    pub fn world_matrix(&self, id: TransformId) -> Mat4 {
        self.resolve(id).world_matrix.get()
    }

    /// World-space position.
    #[must_use]
    #[track_caller]
    pub fn world_position(&self, id: TransformId) -> Vec3 {
        self.world_matrix(id).w_axis.truncate()
    }

    /// World-space scale (length of each basis axis).
    #[must_use]
    #[track_caller]
    pub fn world_scale(&self, id: TransformId) -> Vec3 {
        let matrix = self.world_matrix(id);
        Vec3::new(
            matrix.x_axis.truncate().length(),
            matrix.y_axis.truncate().length(),
            matrix.z_axis.truncate().length(),
        )
    }

    /// World-space orientation (from matrix decomposition).
    #[must_use]
    #[track_caller]
    pub fn world_orientation(&self, id: TransformId) -> Quat {
        let (_, orientation, _) = self.world_matrix(id).to_scale_rotation_translation();
        orientation
    }

    /// Local opacity multiplied by every ancestor's.
    #[must_use]
    #[track_caller]
    pub fn world_opacity(&self, id: TransformId) -> f32 {
        self.resolve(id).world_opacity.get()
    }

    /// Whether both caches of `id` are current, without rebuilding anything.
    #[must_use]
    #[track_caller]
    pub fn is_valid(&self, id: TransformId) -> bool {
        let mut parent_revision = 0;
        for node in self.chain(id).iter().rev() {
            if !node.local_valid.get()
                || !node.world_valid.get()
                || node.parent_revision.get() != parent_revision
            {
                return false;
            }
            parent_revision = node.world_revision.get();
        }
        true
    }

    /// How many times the world cache of `id` has been rebuilt.
    #[must_use]
    #[track_caller]
    pub fn recompute_count(&self, id: TransformId) -> u64 {
        self.node(id).recompute_count.get()
    }

    // -------------------------------------------------------------------------
    // Linkage
    // -------------------------------------------------------------------------

    /// Whether `ancestor` is a strict ancestor of `id`.
    #[must_use]
    pub fn is_ancestor(&self, ancestor: TransformId, id: TransformId) -> bool {
        let mut cursor = self.nodes.get(id).and_then(|node| node.parent);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.nodes.get(current).and_then(|node| node.parent);
        }
        false
    }

    /// Link `child` beneath `parent`.
    ///
    /// A child linked elsewhere is unlinked from its old parent first. The
    /// child's world cache is invalidated immediately.
    ///
    /// # Panics
    ///
    /// Panics if either id is stale or if the link would create a cycle.
    #[track_caller]
    pub fn add_child(&mut self, parent: TransformId, child: TransformId) {
        self.node(parent);
        let previous = self.node(child).parent;
        if parent == child || self.is_ancestor(child, parent) {
            HierarchyError::TransformCycle { parent, child }.raise();
        }
        if previous == Some(parent) {
            return;
        }
        if let Some(previous) = previous {
            self.remove_child(previous, child);
        }

        self.node_mut(parent).children.push(child);
        self.node_mut(child).parent = Some(parent);
        self.invalidate_world(child);
    }

    /// Unlink `child` from `parent`. Returns `false` if it was not linked.
    ///
    /// The removed child is treated as parentless from now on and its world
    /// cache is invalidated immediately.
    pub fn remove_child(&mut self, parent: TransformId, child: TransformId) -> bool {
        let Some(node) = self.nodes.get_mut(parent) else {
            return false;
        };
        let Some(index) = node.children.iter().position(|&c| c == child) else {
            return false;
        };
        node.children.remove(index);

        if let Some(child_node) = self.nodes.get_mut(child) {
            child_node.parent = None;
        }
        self.invalidate_world(child);
        true
    }

    /// Unlink every child of `parent`.
    pub fn remove_all_children(&mut self, parent: TransformId) {
        let Some(node) = self.nodes.get_mut(parent) else {
            return;
        };
        let children = std::mem::take(&mut node.children);
        for child in children {
            if let Some(child_node) = self.nodes.get_mut(child) {
                child_node.parent = None;
            }
            self.invalidate_world(child);
        }
    }

    /// Link `child` beneath `parent`, or unlink it when `parent` is `None`.
    #[track_caller]
    pub fn set_parent(&mut self, child: TransformId, parent: Option<TransformId>) {
        match parent {
            Some(parent) => self.add_child(parent, child),
            None => {
                if let Some(previous) = self.node(child).parent {
                    self.remove_child(previous, child);
                }
            }
        }
    }

    /// Parent of `id`, or `None` if it is unlinked or stale.
    #[must_use]
    pub fn parent(&self, id: TransformId) -> Option<TransformId> {
        self.nodes.get(id).and_then(|node| node.parent)
    }

    /// Children of `id` in link order. Empty for a stale id.
    #[must_use]
    pub fn children(&self, id: TransformId) -> &[TransformId] {
        self.nodes
            .get(id)
            .map(|node| node.children.as_slice())
            .unwrap_or_default()
    }

    fn invalidate_world(&mut self, id: TransformId) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.world_valid.set(false);
            self.notify_subtree(id);
        }
    }

    /// Fire the changed event of `id`, then of each descendant in pre-order.
    ///
    /// Only events are delivered; descendant caches pick up the change
    /// through the revision check on their next read.
    fn notify_subtree(&mut self, id: TransformId) {
        let mut stack: SmallVec<[TransformId; 16]> = SmallVec::new();
        stack.push(id);
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get_mut(current) else {
                continue;
            };
            node.changed.notify(current);
            stack.extend(node.children.iter().rev().copied());
        }
    }

    // -------------------------------------------------------------------------
    // Notification and reset
    // -------------------------------------------------------------------------

    /// Event fired whenever the caches of `id` are invalidated, including
    /// when an ancestor is mutated or re-linked.
    #[track_caller]
    pub fn changed_event(&self, id: TransformId) -> &TransformChangedEvent {
        &self.node(id).changed
    }

    /// Mutable access to the changed event, to connect or disconnect.
    #[track_caller]
    pub fn changed_event_mut(&mut self, id: TransformId) -> &mut TransformChangedEvent {
        &mut self.node_mut(id).changed
    }

    /// Restore identity state, unlink from parent and children, and drop every
    /// subscription. Both caches are left valid at identity.
    #[track_caller]
    pub fn reset(&mut self, id: TransformId) {
        if let Some(parent) = self.node(id).parent {
            self.remove_child(parent, id);
        }
        self.remove_all_children(id);

        let node = self.node_mut(id);
        node.reset_state();
        node.changed.close_all();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::f32::consts::FRAC_PI_2;
    use std::rc::Rc;

    const EPS: f32 = 1e-4;

    fn linked(store: &mut TransformStore) -> (TransformId, TransformId) {
        let parent = store.create();
        let child = store.create();
        store.add_child(parent, child);
        (parent, child)
    }

    fn assert_composed(store: &TransformStore, id: TransformId) {
        let expected = match store.parent(id) {
            Some(parent) => store.world_matrix(parent) * store.local_matrix(id),
            None => store.local_matrix(id),
        };
        assert!(store.world_matrix(id).abs_diff_eq(expected, EPS));
    }

    #[test]
    fn test_new_transform_is_identity() {
        let mut store = TransformStore::new();
        let id = store.create();

        assert_eq!(store.local_position(id), Vec3::ZERO);
        assert_eq!(store.local_scale(id), Vec3::ONE);
        assert_eq!(store.local_orientation(id), Quat::IDENTITY);
        assert_eq!(store.local_opacity(id), 1.0);
        assert!(!store.is_valid(id), "caches start dirty");
        assert_eq!(store.world_matrix(id), Mat4::IDENTITY);
        assert!(store.is_valid(id));
    }

    #[test]
    fn test_world_without_parent_is_local() {
        let mut store = TransformStore::new();
        let id = store.create();

        store.set_position(id, Vec3::new(1.0, 0.0, 0.0));

        assert_eq!(store.world_position(id), Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(store.world_matrix(id), store.local_matrix(id));
    }

    #[test]
    fn test_child_composes_with_parent() {
        let mut store = TransformStore::new();
        let (parent, child) = linked(&mut store);

        store.set_position(parent, Vec3::new(10.0, 0.0, 0.0));
        store.set_position(child, Vec3::new(1.0, 0.0, 0.0));

        assert!(store.world_position(child).abs_diff_eq(Vec3::new(11.0, 0.0, 0.0), EPS));
    }

    #[test]
    fn test_rotated_parent_rotates_child_offset() {
        let mut store = TransformStore::new();
        let (parent, child) = linked(&mut store);

        store.set_position(parent, Vec3::new(10.0, 0.0, 0.0));
        store.set_orientation(parent, Quat::from_rotation_y(FRAC_PI_2));
        store.set_position(child, Vec3::new(1.0, 0.0, 0.0));

        assert!(store.world_position(child).abs_diff_eq(Vec3::new(10.0, 0.0, -1.0), EPS));
        assert_composed(&store, child);
    }

    #[test]
    fn test_mutation_does_not_touch_descendant_flags() {
        let mut store = TransformStore::new();
        let root = store.create();
        let mid = store.create();
        let leaf = store.create();
        store.add_child(root, mid);
        store.add_child(mid, leaf);
        let _ = store.world_matrix(leaf);

        store.set_position(root, Vec3::new(0.0, 5.0, 0.0));

        // Descendants keep their own flag; staleness is detected on read.
        assert!(store.get(leaf).unwrap().world_valid.get());
        assert!(!store.is_valid(leaf));
        assert!(store.world_position(leaf).abs_diff_eq(Vec3::new(0.0, 5.0, 0.0), EPS));
        assert!(store.is_valid(leaf));
    }

    #[test]
    fn test_second_read_is_a_cache_hit() {
        let mut store = TransformStore::new();
        let (parent, child) = linked(&mut store);
        store.set_position(child, Vec3::X);

        let first = store.world_matrix(child);
        let parent_count = store.recompute_count(parent);
        let child_count = store.recompute_count(child);

        let second = store.world_matrix(child);

        assert_eq!(first, second);
        assert_eq!(store.recompute_count(parent), parent_count);
        assert_eq!(store.recompute_count(child), child_count);
    }

    #[test]
    fn test_only_the_read_chain_is_recomputed() {
        let mut store = TransformStore::new();
        let root = store.create();
        let a = store.create();
        let b = store.create();
        store.add_child(root, a);
        store.add_child(root, b);
        let _ = store.world_matrix(a);
        let _ = store.world_matrix(b);
        let b_count = store.recompute_count(b);

        store.move_by(root, Vec3::Y);
        let _ = store.world_matrix(a);

        assert_eq!(store.recompute_count(b), b_count, "sibling stays lazy");
        assert!(!store.is_valid(b));
    }

    #[test]
    fn test_world_matches_composition_after_mutations() {
        let mut store = TransformStore::new();
        let root = store.create();
        let mid = store.create();
        let leaf = store.create();
        store.add_child(root, mid);
        store.add_child(mid, leaf);

        store.set_position(leaf, Vec3::new(0.0, 1.0, 0.0));
        let _ = store.world_matrix(leaf);
        store.set_scale(mid, Vec3::splat(2.0));
        store.rotate_z_by(root, 0.3);
        store.move_by(mid, Vec3::new(3.0, 0.0, 0.0));
        let _ = store.world_matrix(mid);
        store.scale_uniform_by(root, 0.5);

        assert_composed(&store, leaf);
        assert_composed(&store, mid);
        assert_composed(&store, root);
    }

    #[test]
    fn test_set_world_transform_round_trip() {
        let mut store = TransformStore::new();
        let (parent, child) = linked(&mut store);
        store.set_position(parent, Vec3::new(4.0, -2.0, 1.0));
        store.set_orientation(parent, Quat::from_rotation_x(0.7));
        store.set_scale(parent, Vec3::splat(3.0));

        let target = Mat4::from_scale_rotation_translation(
            Vec3::splat(1.5),
            Quat::from_rotation_z(1.1),
            Vec3::new(7.0, 8.0, 9.0),
        );
        store.set_world_transform(child, target);

        assert!(store.world_matrix(child).abs_diff_eq(target, 1e-3));

        // The back-solved local state reproduces the same world matrix.
        store.move_by(child, Vec3::ZERO);
        assert!(store.world_matrix(child).abs_diff_eq(target, 1e-3));
    }

    #[test]
    fn test_set_world_transform_caches_agree_with_local_state() {
        let mut store = TransformStore::new();
        let (parent, child) = linked(&mut store);
        store.set_scale(parent, Vec3::new(1.0, 3.0, 1.0));
        store.set_orientation(parent, Quat::from_rotation_z(0.6));

        // A rotated child under a non-uniformly scaled parent needs shear,
        // which the local state cannot hold.
        let target = Mat4::from_rotation_z(-0.6);
        store.set_world_transform(child, target);

        let decomposed = Mat4::from_scale_rotation_translation(
            store.local_scale(child),
            store.local_orientation(child),
            store.local_position(child),
        );
        assert!(store.local_matrix(child).abs_diff_eq(decomposed, EPS));
        let cached = store.world_matrix(child);
        assert!(cached.abs_diff_eq(store.world_matrix(parent) * decomposed, EPS));

        store.move_by(child, Vec3::ZERO);
        assert!(store.world_matrix(child).abs_diff_eq(cached, EPS));
    }

    #[test]
    fn test_set_world_transform_invalidates_children() {
        let mut store = TransformStore::new();
        let (parent, child) = linked(&mut store);
        store.set_position(child, Vec3::X);
        let _ = store.world_matrix(child);

        store.set_world_transform(parent, Mat4::from_translation(Vec3::new(0.0, 0.0, 5.0)));

        assert!(store.world_position(child).abs_diff_eq(Vec3::new(1.0, 0.0, 5.0), EPS));
    }

    #[test]
    fn test_set_local_transform_decomposes() {
        let mut store = TransformStore::new();
        let id = store.create();
        let matrix = Mat4::from_scale_rotation_translation(
            Vec3::new(1.0, 2.0, 3.0),
            Quat::from_rotation_y(0.5),
            Vec3::new(-1.0, 0.0, 4.0),
        );

        store.set_local_transform(id, matrix);

        assert!(store.local_position(id).abs_diff_eq(Vec3::new(-1.0, 0.0, 4.0), EPS));
        assert!(store.local_scale(id).abs_diff_eq(Vec3::new(1.0, 2.0, 3.0), EPS));
        assert!(store.local_matrix(id).abs_diff_eq(matrix, EPS));
    }

    #[test]
    fn test_add_child_invalidates_child_eagerly() {
        let mut store = TransformStore::new();
        let parent = store.create();
        let child = store.create();
        let _ = store.world_matrix(child);

        let fired = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&fired);
        store.changed_event_mut(child).connect(move |_| *counter.borrow_mut() += 1);

        store.add_child(parent, child);

        assert_eq!(*fired.borrow(), 1);
        assert!(!store.get(child).unwrap().world_valid.get());
        assert_eq!(store.parent(child), Some(parent));
        assert_eq!(store.children(parent), &[child]);
    }

    #[test]
    fn test_remove_child() {
        let mut store = TransformStore::new();
        let (parent, child) = linked(&mut store);
        let stranger = store.create();
        store.set_position(parent, Vec3::splat(10.0));
        store.set_position(child, Vec3::X);
        let _ = store.world_matrix(child);

        assert!(!store.remove_child(parent, stranger));
        assert!(store.remove_child(parent, child));
        assert!(!store.remove_child(parent, child));

        assert_eq!(store.parent(child), None);
        assert!(store.children(parent).is_empty());
        assert_eq!(store.world_position(child), Vec3::X);
    }

    #[test]
    fn test_add_child_moves_between_parents() {
        let mut store = TransformStore::new();
        let (first, child) = linked(&mut store);
        let second = store.create();
        store.set_position(second, Vec3::new(0.0, 0.0, -3.0));

        store.add_child(second, child);

        assert!(store.children(first).is_empty());
        assert_eq!(store.children(second), &[child]);
        assert!(store.world_position(child).abs_diff_eq(Vec3::new(0.0, 0.0, -3.0), EPS));
    }

    #[test]
    fn test_set_parent_both_directions() {
        let mut store = TransformStore::new();
        let parent = store.create();
        let child = store.create();

        store.set_parent(child, Some(parent));
        assert_eq!(store.parent(child), Some(parent));

        store.set_parent(child, None);
        assert_eq!(store.parent(child), None);
        assert!(store.children(parent).is_empty());
    }

    #[test]
    fn test_remove_all_children() {
        let mut store = TransformStore::new();
        let parent = store.create();
        let a = store.create();
        let b = store.create();
        store.add_child(parent, a);
        store.add_child(parent, b);

        store.remove_all_children(parent);

        assert!(store.children(parent).is_empty());
        assert_eq!(store.parent(a), None);
        assert_eq!(store.parent(b), None);
    }

    #[test]
    #[should_panic(expected = "would create a cycle")]
    fn test_linking_beneath_descendant_panics() {
        let mut store = TransformStore::new();
        let (parent, child) = linked(&mut store);
        store.add_child(child, parent);
    }

    #[test]
    #[should_panic(expected = "would create a cycle")]
    fn test_linking_beneath_self_panics() {
        let mut store = TransformStore::new();
        let id = store.create();
        store.add_child(id, id);
    }

    #[test]
    fn test_changed_event_reaches_descendants() {
        let mut store = TransformStore::new();
        let (parent, child) = linked(&mut store);
        let grandchild = store.create();
        store.add_child(child, grandchild);
        let sibling = store.create();
        store.add_child(parent, sibling);

        let log = Rc::new(RefCell::new(Vec::new()));
        for id in [parent, child, grandchild, sibling] {
            let sink = Rc::clone(&log);
            store.changed_event_mut(id).connect(move |changed| sink.borrow_mut().push(changed));
        }

        store.set_position(parent, Vec3::new(10.0, 0.0, 0.0));
        assert_eq!(*log.borrow(), vec![parent, child, grandchild, sibling]);
        assert!(store.world_position(grandchild).abs_diff_eq(Vec3::new(10.0, 0.0, 0.0), EPS));

        log.borrow_mut().clear();
        store.move_by(child, Vec3::Y);
        assert_eq!(*log.borrow(), vec![child, grandchild], "ancestors are not notified");
    }

    #[test]
    fn test_notifying_descendants_leaves_their_caches_lazy() {
        let mut store = TransformStore::new();
        let (parent, child) = linked(&mut store);
        let _ = store.world_matrix(child);
        let child_count = store.recompute_count(child);

        store.set_position(parent, Vec3::Z);

        assert!(store.get(child).unwrap().world_valid.get());
        assert_eq!(store.recompute_count(child), child_count);
        assert!(store.world_position(child).abs_diff_eq(Vec3::Z, EPS));
    }

    #[test]
    fn test_relinking_notifies_moved_subtree() {
        let mut store = TransformStore::new();
        let (parent, child) = linked(&mut store);
        let grandchild = store.create();
        store.add_child(child, grandchild);
        let other = store.create();

        let fired = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&fired);
        store.changed_event_mut(grandchild).connect(move |_| *counter.borrow_mut() += 1);

        store.remove_child(parent, child);
        store.add_child(other, child);

        assert_eq!(*fired.borrow(), 2);
    }

    #[test]
    fn test_every_setter_invalidates() {
        let mut store = TransformStore::new();
        let id = store.create();
        let fired = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&fired);
        store.changed_event_mut(id).connect(move |_| *counter.borrow_mut() += 1);

        let _ = store.world_matrix(id);
        store.set_position(id, Vec3::ZERO);
        assert!(!store.is_valid(id), "writing the same value still invalidates");

        store.set_scale(id, Vec3::ONE);
        store.set_orientation(id, Quat::IDENTITY);
        store.set_opacity(id, 1.0);
        store.rotate_x_by(id, 0.0);
        store.scale_to(id, Vec3::ONE);

        assert_eq!(*fired.borrow(), 6);
    }

    #[test]
    fn test_world_opacity_multiplies_ancestors() {
        let mut store = TransformStore::new();
        let (parent, child) = linked(&mut store);

        store.set_opacity(parent, 0.5);
        store.set_opacity(child, 0.5);

        assert!((store.world_opacity(child) - 0.25).abs() < EPS);

        store.set_opacity(parent, 1.0);
        assert!((store.world_opacity(child) - 0.5).abs() < EPS);
    }

    #[test]
    fn test_world_scale_and_orientation() {
        let mut store = TransformStore::new();
        let (parent, child) = linked(&mut store);
        store.set_scale(parent, Vec3::new(2.0, 3.0, 4.0));
        store.set_orientation(child, Quat::from_rotation_y(0.4));
        store.set_scale(child, Vec3::splat(0.5));

        assert!(store.world_orientation(parent).abs_diff_eq(Quat::IDENTITY, EPS));
        assert!(store.world_scale(parent).abs_diff_eq(Vec3::new(2.0, 3.0, 4.0), EPS));
        // Rotation about Y mixes X and Z, the Y axis is untouched.
        assert!((store.world_scale(child).y - 1.5).abs() < EPS);
    }

    #[test]
    fn test_orientation_is_stored_as_given_by_default() {
        let mut store = TransformStore::new();
        let id = store.create();
        let skewed = Quat::from_xyzw(0.0, 0.0, 0.0, 2.0);

        store.set_orientation(id, skewed);

        assert_eq!(store.local_orientation(id), skewed);
    }

    #[test]
    fn test_orientation_normalization_when_enabled() {
        let mut store = TransformStore::new();
        store.set_normalize_orientation(true);
        let id = store.create();

        store.set_orientation(id, Quat::from_xyzw(0.0, 0.0, 0.0, 2.0));

        assert!(store.local_orientation(id).abs_diff_eq(Quat::IDENTITY, EPS));
    }

    #[test]
    fn test_look_at_faces_target() {
        let mut store = TransformStore::new();
        let id = store.create();

        store.set_look_at(id, Vec3::ZERO, Vec3::new(5.0, 0.0, 0.0), Vec3::Y);

        let forward = store.get(id).unwrap().forward();
        assert!(forward.abs_diff_eq(Vec3::X, EPS));
    }

    #[test]
    fn test_reset_restores_identity_and_drops_links() {
        let mut store = TransformStore::new();
        let (parent, child) = linked(&mut store);
        let grandchild = store.create();
        store.add_child(child, grandchild);
        store.set_position(child, Vec3::splat(4.0));
        store.changed_event_mut(child).connect(|_| {});

        store.reset(child);

        assert_eq!(store.local_position(child), Vec3::ZERO);
        assert_eq!(store.parent(child), None);
        assert!(store.children(child).is_empty());
        assert!(store.children(parent).is_empty());
        assert_eq!(store.parent(grandchild), None);
        assert!(store.changed_event(child).is_empty());
        assert!(store.is_valid(child));
        assert_eq!(store.world_matrix(child), Mat4::IDENTITY);
    }

    #[test]
    fn test_destroy_unlinks_both_sides() {
        let mut store = TransformStore::new();
        let (parent, child) = linked(&mut store);
        let grandchild = store.create();
        store.add_child(child, grandchild);

        assert!(store.destroy(child));
        assert!(!store.destroy(child));

        assert!(!store.contains(child));
        assert!(store.children(parent).is_empty());
        assert_eq!(store.parent(grandchild), None);
        assert_eq!(store.len(), 2);
    }

    #[test]
    #[should_panic(expected = "does not exist")]
    fn test_stale_id_panics_on_read() {
        let mut store = TransformStore::new();
        let id = store.create();
        store.destroy(id);
        let _ = store.world_matrix(id);
    }
}
