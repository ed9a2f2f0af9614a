//! Configuration for schema inference

use serde::{Deserialize, Serialize};

/// Configuration for schema inference
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceConfig {
    /// Maximum nesting depth for objects and arrays
    pub max_depth: usize,

    /// Collect example values on leaf fields
    pub collect_examples: bool,

    /// Maximum number of distinct examples kept per leaf path
    pub max_examples: usize,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            max_depth: 64,
            collect_examples: true,
            max_examples: 3,
        }
    }
}

impl InferenceConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder for custom configuration
    pub fn builder() -> InferenceConfigBuilder {
        InferenceConfigBuilder::default()
    }
}

/// Builder for InferenceConfig
#[derive(Debug, Default)]
pub struct InferenceConfigBuilder {
    config: InferenceConfig,
}

impl InferenceConfigBuilder {
    /// Set the maximum nesting depth
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.config.max_depth = depth;
        self
    }

    /// Enable or disable example collection
    pub fn collect_examples(mut self, collect: bool) -> Self {
        self.config.collect_examples = collect;
        self
    }

    /// Set the maximum number of examples per leaf path
    pub fn max_examples(mut self, max: usize) -> Self {
        self.config.max_examples = max;
        self
    }

    /// Build the configuration
    pub fn build(self) -> InferenceConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = InferenceConfig::default();
        assert_eq!(config.max_examples, 3);
        assert!(config.collect_examples);
    }

    #[test]
    fn test_builder() {
        let config = InferenceConfig::builder()
            .max_depth(5)
            .collect_examples(false)
            .max_examples(1)
            .build();

        assert_eq!(config.max_depth, 5);
        assert!(!config.collect_examples);
        assert_eq!(config.max_examples, 1);
    }
}
