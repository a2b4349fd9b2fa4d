//! Host Provisioner declarations
//!
//! The single compute host: a fixed size and image, placed in the network,
//! behind the traffic policy, running as the execution identity, with the
//! assembled script as its only first-boot input.

use crate::error::DefinitionError;
use crate::types::{IdentityHandle, KeyPairHandle, NetworkHandle, SecurityHandle};
use serde::{Deserialize, Serialize};

/// Instance size of the host
pub const INSTANCE_TYPE: &str = "t3.medium";

/// Raw user-data limit of the compute platform
pub const USER_DATA_LIMIT: usize = 16 * 1024;

const SHEBANG: &str = "#!/bin/bash";

/// Host operating system image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineImage {
    /// Latest Amazon Linux 2023, x86_64
    #[default]
    AmazonLinux2023,
}

impl MachineImage {
    /// Public parameter path resolving to the latest image id
    #[inline]
    #[must_use]
    pub const fn parameter(self) -> &'static str {
        match self {
            Self::AmazonLinux2023 => {
                "/aws/service/ami-amazon-linux-latest/al2023-ami-kernel-default-x86_64"
            }
        }
    }
}

/// First-boot script handed to the host, opaque to the provisioner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BootScript(String);

impl BootScript {
    /// Linux user data: prepends a bash shebang unless the script has one
    ///
    /// # Errors
    /// Returns `UserDataTooLarge` when the rendered script exceeds
    /// [`USER_DATA_LIMIT`]
    pub fn for_linux(script: impl Into<String>) -> Result<Self, DefinitionError> {
        let script = script.into();
        let rendered = if script.starts_with("#!") {
            script
        } else {
            format!("{SHEBANG}\n{script}")
        };
        if rendered.len() > USER_DATA_LIMIT {
            return Err(DefinitionError::UserDataTooLarge {
                size: rendered.len(),
                limit: USER_DATA_LIMIT,
            });
        }
        Ok(Self(rendered))
    }

    /// Script text
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Size in bytes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the script is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// SSH key algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    /// Ed25519
    #[default]
    Ed25519,
    /// RSA
    Rsa,
}

/// Private key encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyFormat {
    /// PEM
    #[default]
    Pem,
    /// PuTTY
    Ppk,
}

/// SSH key pair declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KeyPairSpec {
    /// Algorithm
    pub key_type: KeyType,
    /// Private key encoding
    pub format: KeyFormat,
}

/// Compute host declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSpec {
    /// Network to place the host in
    pub network: NetworkHandle,
    /// Traffic policy
    pub security: SecurityHandle,
    /// Identity the host runs as
    pub identity: IdentityHandle,
    /// Optional SSH key pair
    pub key_pair: Option<KeyPairHandle>,
    /// Instance size
    pub instance_type: String,
    /// Image
    pub image: MachineImage,
    /// First-boot script
    pub boot_script: BootScript,
}

impl HostSpec {
    /// Host of the fixed size and image
    #[must_use]
    pub fn new(
        network: NetworkHandle,
        security: SecurityHandle,
        identity: IdentityHandle,
        boot_script: BootScript,
    ) -> Self {
        Self {
            network,
            security,
            identity,
            key_pair: None,
            instance_type: INSTANCE_TYPE.to_string(),
            image: MachineImage::default(),
            boot_script,
        }
    }

    /// With SSH key pair
    #[inline]
    #[must_use]
    pub fn with_key_pair(mut self, key_pair: KeyPairHandle) -> Self {
        self.key_pair = Some(key_pair);
        self
    }
}
