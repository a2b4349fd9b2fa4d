//! Environment configuration
//!
//! Every field defaults to the reference environment, so an empty file (or
//! no file) yields the stock stack. Loaded from TOML:
//!
//! ```toml
//! stack_name = "DevHostStack"
//!
//! [network]
//! max_azs = 2
//!
//! [bootstrap]
//! template = "scripts/setup-chainlit.sh.template"
//! sources = "src"
//! ```

use crate::error::ConfigError;
use devstack_bootstrap::{ScriptAssembler, SourceFilter, DEFAULT_DELIMITER, DEFAULT_EXTENSION, DEFAULT_PLACEHOLDER};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Table settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TablesConfig {
    /// Physical name of the chat data table
    pub chat_table: String,
    /// Secondary access pattern listing a user's threads
    pub thread_index: String,
    /// Partition attribute of the thread pattern
    pub thread_partition: String,
    /// Sort attribute of the thread pattern
    pub thread_sort: String,
    /// Non-key attributes projected into the thread pattern
    pub thread_projection: Vec<String>,
    /// Physical name of the auth table
    pub auth_table: String,
    /// Partition attribute of the auth table
    pub auth_key: String,
}

impl Default for TablesConfig {
    fn default() -> Self {
        Self {
            chat_table: "ChainlitData".to_string(),
            thread_index: "UserThread".to_string(),
            thread_partition: "UserThreadPK".to_string(),
            thread_sort: "UserThreadSK".to_string(),
            thread_projection: vec!["id".to_string(), "name".to_string()],
            auth_table: "UserAuth".to_string(),
            auth_key: "username".to_string(),
        }
    }
}

/// Network settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkConfig {
    /// Zones to spread subnets over
    pub max_azs: u8,
    /// Prefix length of each subnet
    pub cidr_mask: u8,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            max_azs: 2,
            cidr_mask: 24,
        }
    }
}

/// Boot script assembly settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BootstrapConfig {
    /// Script template
    pub template: PathBuf,
    /// Directory of source payloads
    pub sources: PathBuf,
    /// Extension of the payloads to embed
    pub extension: String,
    /// Placeholder token in the template
    pub placeholder: String,
    /// Heredoc delimiter
    pub delimiter: String,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            template: PathBuf::from("scripts/setup-chainlit.sh.template"),
            sources: PathBuf::from("src"),
            extension: DEFAULT_EXTENSION.to_string(),
            placeholder: DEFAULT_PLACEHOLDER.to_string(),
            delimiter: DEFAULT_DELIMITER.to_string(),
        }
    }
}

impl BootstrapConfig {
    /// Assembler configured with these settings
    #[must_use]
    pub fn assembler(&self) -> ScriptAssembler {
        ScriptAssembler::new()
            .with_placeholder(self.placeholder.clone())
            .with_delimiter(self.delimiter.clone())
            .with_filter(SourceFilter::extension(&self.extension))
    }

    /// Template and source paths resolved against `base`
    #[must_use]
    pub fn paths(&self, base: &Path) -> (PathBuf, PathBuf) {
        (base.join(&self.template), base.join(&self.sources))
    }
}

/// Whole environment configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DevStackConfig {
    /// Stack name
    pub stack_name: String,
    /// Account id, or a pseudo parameter resolved at deploy time
    pub account: String,
    /// Region, or a pseudo parameter resolved at deploy time
    pub region: String,
    /// Prefix of the storage bucket name
    pub bucket_prefix: String,
    /// Declare and attach an SSH key pair
    pub key_pair: bool,
    /// Tables
    pub tables: TablesConfig,
    /// Network
    pub network: NetworkConfig,
    /// Boot script
    pub bootstrap: BootstrapConfig,
}

impl Default for DevStackConfig {
    fn default() -> Self {
        Self {
            stack_name: "DevHostStack".to_string(),
            account: "${AWS::AccountId}".to_string(),
            region: "${AWS::Region}".to_string(),
            bucket_prefix: "chainlit-storage".to_string(),
            key_pair: true,
            tables: TablesConfig::default(),
            network: NetworkConfig::default(),
            bootstrap: BootstrapConfig::default(),
        }
    }
}

impl DevStackConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a TOML file
    ///
    /// # Errors
    /// Returns `Io`, `Parse` or `InvalidValue`
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&text).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;
        tracing::debug!(path = %path.display(), stack = %config.stack_name, "loaded config");
        Ok(config)
    }

    /// Parse from TOML text
    ///
    /// # Errors
    /// Returns `Parse` or `InvalidValue`
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check values the schema cannot express
    ///
    /// # Errors
    /// Returns `InvalidValue` for the first unusable field
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &'static str, reason: &str| ConfigError::InvalidValue {
            field,
            reason: reason.to_string(),
        };
        if self.network.max_azs == 0 {
            return Err(invalid("network.max_azs", "must be at least 1"));
        }
        if !(16..=28).contains(&self.network.cidr_mask) {
            return Err(invalid("network.cidr_mask", "must be between 16 and 28"));
        }
        if self.bootstrap.extension.is_empty() {
            return Err(invalid("bootstrap.extension", "must not be empty"));
        }
        if self.bootstrap.placeholder.is_empty() {
            return Err(invalid("bootstrap.placeholder", "must not be empty"));
        }
        if self.bucket_prefix.is_empty() {
            return Err(invalid("bucket_prefix", "must not be empty"));
        }
        Ok(())
    }

    /// Physical bucket name, `<prefix>-<account>-<region>`
    #[must_use]
    pub fn bucket_name(&self) -> String {
        format!("{}-{}-{}", self.bucket_prefix, self.account, self.region)
    }

    /// With stack name
    #[inline]
    #[must_use]
    pub fn with_stack_name(mut self, name: impl Into<String>) -> Self {
        self.stack_name = name.into();
        self
    }

    /// With account and region
    #[inline]
    #[must_use]
    pub fn with_target(mut self, account: impl Into<String>, region: impl Into<String>) -> Self {
        self.account = account.into();
        self.region = region.into();
        self
    }

    /// With zone count
    #[inline]
    #[must_use]
    pub fn with_max_azs(mut self, max_azs: u8) -> Self {
        self.network.max_azs = max_azs;
        self
    }

    /// With template and source directory
    #[inline]
    #[must_use]
    pub fn with_bootstrap_paths(mut self, template: impl Into<PathBuf>, sources: impl Into<PathBuf>) -> Self {
        self.bootstrap.template = template.into();
        self.bootstrap.sources = sources.into();
        self
    }

    /// With SSH key pair on or off
    #[inline]
    #[must_use]
    pub fn with_key_pair(mut self, enabled: bool) -> Self {
        self.key_pair = enabled;
        self
    }
}
