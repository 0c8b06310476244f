//! Shared test fixtures

use std::cell::RefCell;
use std::rc::Rc;

use crate::ecs::{Component, ComponentContext, QueryMask, World};

/// Shared, ordered record of lifecycle calls
#[derive(Debug, Clone, Default)]
pub(crate) struct LifecycleLog(Rc<RefCell<Vec<String>>>);

impl LifecycleLog {
    pub(crate) fn push(&self, entry: String) {
        self.0.borrow_mut().push(entry);
    }

    pub(crate) fn entries(&self) -> Vec<String> {
        self.0.borrow().clone()
    }

    pub(crate) fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

/// Component that writes `label:hook` to a log for every hook it receives
pub(crate) struct Recorder {
    label: String,
    log: LifecycleLog,
    mask: QueryMask,
}

impl Recorder {
    pub(crate) fn new(label: &str, log: &LifecycleLog) -> Self {
        Self {
            label: label.to_string(),
            log: log.clone(),
            mask: 0,
        }
    }

    pub(crate) fn with_mask(mut self, mask: QueryMask) -> Self {
        self.mask = mask;
        self
    }

    pub(crate) fn label(&self) -> &str {
        &self.label
    }

    fn record(&self, hook: &str) {
        self.log.push(format!("{}:{hook}", self.label));
    }
}

impl Component for Recorder {
    fn query_mask(&self) -> QueryMask {
        self.mask
    }

    fn on_added_to_entity(&mut self, _world: &mut World, _ctx: ComponentContext) {
        self.record("added_to_entity");
    }

    fn on_removed_from_entity(&mut self, _world: &mut World, _ctx: ComponentContext) {
        self.record("removed_from_entity");
    }

    fn on_added_to_scene(&mut self, _world: &mut World, _ctx: ComponentContext) {
        self.record("added_to_scene");
    }

    fn on_removed_from_scene(&mut self, _world: &mut World, _ctx: ComponentContext) {
        self.record("removed_from_scene");
    }

    fn on_update(&mut self, _world: &mut World, _ctx: ComponentContext, _dt: f32) {
        self.record("update");
    }

    fn on_fixed_update(&mut self, _world: &mut World, _ctx: ComponentContext, _dt: f32) {
        self.record("fixed_update");
    }
}
