//! Stage type definitions and their registry.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

/// Static description of a stage type.
///
/// A definition names the top-level context keys it governs: subtrees whose
/// content belongs to the deployment target and may opt out of expression
/// evaluation.
pub trait StageDefinition: Send + Sync + Debug {
    /// The stage type this definition describes.
    fn stage_type(&self) -> &str;

    /// Top-level context keys governed by this stage type.
    fn governed_fields(&self) -> &[&str] {
        &[]
    }
}

/// Deploys Kubernetes manifests; governs `manifests`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeployManifestStage;

impl DeployManifestStage {
    /// Stage type name.
    pub const TYPE: &'static str = "deployManifest";
    /// Governed key holding the manifests.
    pub const MANIFESTS: &'static str = "manifests";
}

const DEPLOY_MANIFEST_GOVERNED: &[&str] = &[DeployManifestStage::MANIFESTS];

impl StageDefinition for DeployManifestStage {
    fn stage_type(&self) -> &str {
        Self::TYPE
    }

    fn governed_fields(&self) -> &[&str] {
        DEPLOY_MANIFEST_GOVERNED
    }
}

/// Runs a job; governs nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunJobStage;

impl RunJobStage {
    /// Stage type name.
    pub const TYPE: &'static str = "runJob";
}

impl StageDefinition for RunJobStage {
    fn stage_type(&self) -> &str {
        Self::TYPE
    }
}

/// Lookup of stage definitions by type.
#[derive(Debug, Clone, Default)]
pub struct StageDefinitionRegistry {
    definitions: HashMap<String, Arc<dyn StageDefinition>>,
}

impl StageDefinitionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in definitions.
    #[must_use]
    pub fn builtins() -> Self {
        let mut registry = Self::new();
        registry.register(DeployManifestStage);
        registry.register(RunJobStage);
        registry
    }

    /// Registers a definition, replacing any with the same type.
    pub fn register(&mut self, definition: impl StageDefinition + 'static) {
        self.definitions
            .insert(definition.stage_type().to_string(), Arc::new(definition));
    }

    /// Looks up a definition.
    #[must_use]
    pub fn get(&self, stage_type: &str) -> Option<&Arc<dyn StageDefinition>> {
        self.definitions.get(stage_type)
    }

    /// Governed keys for `stage_type`; empty for unknown types.
    #[must_use]
    pub fn governed_fields(&self, stage_type: &str) -> Vec<String> {
        self.get(stage_type)
            .map(|d| d.governed_fields().iter().map(|f| (*f).to_string()).collect())
            .unwrap_or_default()
    }

    /// Returns the number of registered definitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Returns true if no definitions are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
