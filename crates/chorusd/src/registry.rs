//! Backend registry: which models answer in which mode.

use crate::config::ModesConfig;
use chorus_common::Mode;
use serde::{Deserialize, Serialize};

/// A text-generation backend: display name plus model identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendDescriptor {
    pub name: String,
    pub model: String,
}

impl BackendDescriptor {
    pub fn new(name: &str, model: &str) -> Self {
        Self {
            name: name.to_string(),
            model: model.to_string(),
        }
    }

    /// Descriptor whose display name is the model name
    pub fn model(model: &str) -> Self {
        Self::new(model, model)
    }
}

/// Ordered backend lists per mode
#[derive(Debug, Clone)]
pub struct BackendRegistry {
    fast: Vec<BackendDescriptor>,
    quality: Vec<BackendDescriptor>,
}

impl BackendRegistry {
    pub fn new(fast: Vec<BackendDescriptor>, quality: Vec<BackendDescriptor>) -> Self {
        Self { fast, quality }
    }

    pub fn from_config(modes: &ModesConfig) -> Self {
        Self::new(modes.fast.backends.clone(), modes.quality.backends.clone())
    }

    pub fn for_mode(&self, mode: Mode) -> &[BackendDescriptor] {
        match mode {
            Mode::Fast => &self.fast,
            Mode::Quality => &self.quality,
        }
    }

    pub fn count(&self, mode: Mode) -> usize {
        self.for_mode(mode).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_sizes() {
        let registry = BackendRegistry::from_config(&ModesConfig::default());
        assert_eq!(registry.count(Mode::Fast), 2);
        assert_eq!(registry.count(Mode::Quality), 3);
        assert!(registry.count(Mode::Fast) < registry.count(Mode::Quality));
    }

    #[test]
    fn test_order_is_preserved() {
        let registry = BackendRegistry::new(
            vec![BackendDescriptor::model("b"), BackendDescriptor::model("a")],
            vec![],
        );
        let names: Vec<&str> = registry
            .for_mode(Mode::Fast)
            .iter()
            .map(|b| b.name.as_str())
            .collect();
        assert_eq!(names, vec!["b", "a"]);
        assert!(registry.for_mode(Mode::Quality).is_empty());
    }
}
