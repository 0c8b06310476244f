//! World configuration
//!
//! Sizing hints for the arenas plus the orientation policy. Can be built in
//! code with the `with_*` builders or loaded from RON.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::ConfigError;

/// Configuration for a [`World`](crate::ecs::World).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Initial capacity of the entity arena
    pub entity_capacity: usize,
    /// Initial capacity of the component arena
    pub component_capacity: usize,
    /// Initial capacity of the transform arena
    pub transform_capacity: usize,
    /// Normalize every orientation written to a transform.
    ///
    /// Off by default: orientations are stored exactly as given and a
    /// non-unit quaternion flows into the cached matrices unchanged.
    pub normalize_orientation: bool,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            entity_capacity: 256,
            component_capacity: 512,
            transform_capacity: 256,
            normalize_orientation: false,
        }
    }
}

impl WorldConfig {
    /// Set the entity arena capacity. Transforms are sized to match.
    pub fn with_entity_capacity(mut self, capacity: usize) -> Self {
        self.entity_capacity = capacity;
        self.transform_capacity = self.transform_capacity.max(capacity);
        self
    }

    /// Set the component arena capacity
    pub fn with_component_capacity(mut self, capacity: usize) -> Self {
        self.component_capacity = capacity;
        self
    }

    /// Enable or disable orientation normalization
    pub fn with_normalized_orientation(mut self, normalize: bool) -> Self {
        self.normalize_orientation = normalize;
        self
    }

    /// Parse a config from RON text. Missing fields keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid `WorldConfig`
    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        ron::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load a config from a RON file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    pub fn load_ron(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_ron_str(&content)
    }

    /// Save the config to a RON file
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or the file cannot be written
    pub fn save_ron(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let text = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;
        fs::write(path, text)?;
        Ok(())
    }
}
