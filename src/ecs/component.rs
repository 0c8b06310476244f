//! Components and capability tags
//!
//! A component is a boxed trait object owned by the [`World`]. It can be
//! attached to at most one entity at a time and receives lifecycle hooks as
//! that entity enters and leaves a scene.
//!
//! Lookups go through a [`Capability`] rather than a concrete type, so a
//! component can answer for interface tags as well as for itself:
//!
//! ```ignore
//! trait Renderable {}
//!
//! struct Sprite;
//! impl Renderable for Sprite {}
//!
//! impl Component for Sprite {
//!     fn is_a(&self, capability: Capability) -> bool {
//!         capability == Capability::of::<dyn Renderable>()
//!             || capability == self.type_capability()
//!     }
//! }
//! ```

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::ecs::{ComponentId, EntityId, World};

/// Bit mask narrowing component lookups.
///
/// A lookup mask of `0` matches every component; any other mask matches a
/// component whose own mask shares at least one bit with it.
pub type QueryMask = u32;

/// Whether a component with `component_mask` passes a lookup with `lookup`.
#[must_use]
#[inline]
pub fn mask_matches(lookup: QueryMask, component_mask: QueryMask) -> bool {
    lookup == 0 || lookup & component_mask != 0
}

// ============================================================================
// Capability
// ============================================================================

/// Stable identifier for a component type or interface.
///
/// Two capabilities are equal when they were built from the same type; the
/// name is only carried for diagnostics.
#[derive(Clone, Copy)]
pub struct Capability {
    id: TypeId,
    name: &'static str,
}

impl Capability {
    /// Capability of a concrete type or a `dyn Trait` interface.
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Type name this capability was built from.
    #[must_use]
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Underlying type id.
    #[must_use]
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.id
    }
}

impl PartialEq for Capability {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Capability {}

impl Hash for Capability {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Capability({})", self.name)
    }
}

// ============================================================================
// Component
// ============================================================================

/// Handles passed to every lifecycle hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentContext {
    /// Entity the component is attached to
    pub entity: EntityId,
    /// The component's own id
    pub component: ComponentId,
}

/// Downcasting support, implemented for every `'static` type.
pub trait AsAny: Any {
    /// Borrow as `&dyn Any`.
    fn as_any(&self) -> &dyn Any;
    /// Borrow as `&mut dyn Any`.
    fn as_any_mut(&mut self) -> &mut dyn Any;
    /// Capability of the concrete type.
    fn type_capability(&self) -> Capability;
    /// Name of the concrete type.
    fn type_name(&self) -> &'static str;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn type_capability(&self) -> Capability {
        Capability::of::<T>()
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// A unit of behavior attachable to one entity.
///
/// Every hook is a no-op by default. Hooks receive the world mutably, so a
/// component may look up siblings or restructure the hierarchy from inside a
/// hook. While a hook runs the component is checked out of the world and is
/// not visible to lookups.
///
/// Lifecycle hooks aimed at a checked-out component (for example when it
/// detaches itself or destroys its own entity from `on_update`) are queued
/// and delivered in order as soon as the running hook returns. By then the
/// entity in `ctx` may already be gone. Re-entrant ticks are dropped.
#[allow(unused_variables)]
pub trait Component: AsAny {
    /// Whether this component answers for `capability`.
    fn is_a(&self, capability: Capability) -> bool {
        capability == self.type_capability()
    }

    /// Mask tested against lookup masks. Zero never matches a non-zero lookup.
    fn query_mask(&self) -> QueryMask {
        0
    }

    /// Called right after the component is attached to an entity.
    fn on_added_to_entity(&mut self, world: &mut World, ctx: ComponentContext) {}

    /// Called right before the component is detached from its entity.
    fn on_removed_from_entity(&mut self, world: &mut World, ctx: ComponentContext) {}

    /// Called once when the owning entity becomes part of a scene.
    fn on_added_to_scene(&mut self, world: &mut World, ctx: ComponentContext) {}

    /// Called once when the owning entity leaves its scene.
    fn on_removed_from_scene(&mut self, world: &mut World, ctx: ComponentContext) {}

    /// Per-frame tick.
    fn on_update(&mut self, world: &mut World, ctx: ComponentContext, dt: f32) {}

    /// Fixed-step tick.
    fn on_fixed_update(&mut self, world: &mut World, ctx: ComponentContext, dt: f32) {}
}

impl dyn Component {
    /// Downcast to a concrete component type.
    #[must_use]
    pub fn downcast_ref<T: Component>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Mutably downcast to a concrete component type.
    #[must_use]
    pub fn downcast_mut<T: Component>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }

    /// Whether the concrete type is `T`.
    #[must_use]
    pub fn is<T: Component>(&self) -> bool {
        self.as_any().is::<T>()
    }
}

impl fmt::Debug for dyn Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Component({})", self.type_name())
    }
}
