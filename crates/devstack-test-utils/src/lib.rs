//! Testing utilities for the devstack workspace
//!
//! Shared fixtures: an in-memory provisioning engine and a throwaway source
//! tree for assembly tests.

#![allow(missing_docs)]

use async_trait::async_trait;
use devstack_bootstrap::DEFAULT_PLACEHOLDER;
use devstack_kernel::config::DevStackConfig;
use devstack_kernel::definition::{OutputValue, StackDefinition};
use devstack_kernel::engine::{Deployment, ProvisioningEngine};
use devstack_kernel::host::BootScript;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const FAKE_INSTANCE_ID: &str = "i-0123456789abcdef0";

/// Engine failure used to check errors pass through unchanged
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("engine rejected stack: {0}")]
pub struct EngineRejected(pub String);

/// Engine that records what it was handed and resolves outputs to fakes
#[derive(Debug, Default)]
pub struct RecordingEngine {
    deployed: Mutex<Vec<String>>,
    reject: Option<String>,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine whose every deploy fails with `reason`
    pub fn rejecting(reason: &str) -> Self {
        Self {
            deployed: Mutex::new(Vec::new()),
            reject: Some(reason.to_string()),
        }
    }

    /// Fingerprints of every definition handed over, in call order
    pub fn deployed(&self) -> Vec<String> {
        self.deployed.lock().clone()
    }
}

#[async_trait]
impl ProvisioningEngine for RecordingEngine {
    type Error = EngineRejected;

    fn name(&self) -> &'static str {
        "recording"
    }

    async fn deploy(&self, definition: &StackDefinition) -> Result<Deployment, EngineRejected> {
        self.deployed.lock().push(definition.fingerprint().to_string());
        if let Some(reason) = &self.reject {
            return Err(EngineRejected(reason.clone()));
        }

        let outputs: IndexMap<String, String> = definition
            .outputs()
            .iter()
            .map(|(name, output)| {
                let value = match &output.value {
                    OutputValue::HostId(_) => FAKE_INSTANCE_ID.to_string(),
                    OutputValue::ResourceName(r) => format!("physical-{}", r.id()),
                };
                (name.clone(), value)
            })
            .collect();
        Ok(Deployment::new(definition, outputs))
    }
}

/// Temporary directory holding a script template and a source directory
pub struct SourceTree {
    dir: TempDir,
}

impl SourceTree {
    pub const TEMPLATE: &'static str = "scripts/setup.sh.template";
    pub const SOURCES: &'static str = "src";

    /// Tree with `template` and no sources
    pub fn new(template: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("scripts")).unwrap();
        std::fs::create_dir_all(dir.path().join(Self::SOURCES)).unwrap();
        std::fs::write(dir.path().join(Self::TEMPLATE), template).unwrap();
        Self { dir }
    }

    /// Tree with a template wrapping the placeholder in two echo lines
    pub fn standard() -> Self {
        Self::new(&format!("echo start\n{DEFAULT_PLACEHOLDER}\necho done\n"))
    }

    /// Add a source file
    pub fn with_source(self, name: &str, content: &str) -> Self {
        std::fs::write(self.sources().join(name), content).unwrap();
        self
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn template(&self) -> PathBuf {
        self.dir.path().join(Self::TEMPLATE)
    }

    pub fn sources(&self) -> PathBuf {
        self.dir.path().join(Self::SOURCES)
    }

    /// Config pointing at this tree, relative to [`SourceTree::root`]
    pub fn config(&self) -> DevStackConfig {
        DevStackConfig::default().with_bootstrap_paths(Self::TEMPLATE, Self::SOURCES)
    }
}

pub fn boot_script() -> BootScript {
    BootScript::for_linux("echo ready").unwrap()
}
