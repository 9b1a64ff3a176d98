//! Codec and container configuration.
//!
//! Options are plain serde structs with defaults for every field, so a configuration file only
//! needs to name the values it changes:
//!
//! ```rust
//! use opcua_avro::config::{Compression, Settings};
//!
//! let settings = Settings::from_yaml_str(
//!     "codec:\n  max_string_length: 1024\ncontainer:\n  compression: deflate\n",
//! )
//! .unwrap();
//! assert_eq!(settings.codec.max_string_length, 1024);
//! assert_eq!(settings.codec.max_bytes_length, 65536);
//! assert_eq!(settings.container.compression, Compression::Deflate);
//! ```

use serde::{Deserialize, Serialize};

use crate::{CodecError, Result};

/// Default cap for decoded string and byte string lengths.
pub const DEFAULT_MAX_LENGTH: usize = 65536;

/// Default cap for open traversal frames.
pub const DEFAULT_MAX_NESTING_DEPTH: usize = 100;

/// Limits enforced by the primitive codec and the validating codecs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecOptions {
    /// Maximum decoded string length in bytes
    pub max_string_length: usize,
    /// Maximum decoded byte string length
    pub max_bytes_length: usize,
    /// Maximum number of elements in one array value
    pub max_array_length: usize,
    /// Maximum number of open traversal frames
    pub max_nesting_depth: usize,
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self {
            max_string_length: DEFAULT_MAX_LENGTH,
            max_bytes_length: DEFAULT_MAX_LENGTH,
            max_array_length: DEFAULT_MAX_LENGTH,
            max_nesting_depth: DEFAULT_MAX_NESTING_DEPTH,
        }
    }
}

impl CodecOptions {
    /// Reject limits that would make every message fail.
    pub fn validate(&self) -> Result<()> {
        let limits = [
            ("max_string_length", self.max_string_length),
            ("max_bytes_length", self.max_bytes_length),
            ("max_array_length", self.max_array_length),
            ("max_nesting_depth", self.max_nesting_depth),
        ];
        for (name, value) in limits {
            if value == 0 {
                return Err(CodecError::config(format!("{name} must be greater than zero")));
            }
        }
        Ok(())
    }
}

/// Block compression used by the container file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    Null,
    Deflate,
}

impl Compression {
    /// Name stored under the `avro.codec` metadata key.
    pub const fn name(&self) -> &'static str {
        match self {
            Compression::Null => "null",
            Compression::Deflate => "deflate",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "null" => Ok(Compression::Null),
            "deflate" => Ok(Compression::Deflate),
            other => Err(CodecError::format(format!("Unknown compression codec '{other}'"))),
        }
    }
}

/// Container writer settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerOptions {
    pub compression: Compression,
    /// Flush a block once it holds this many objects
    pub block_object_limit: usize,
    /// Flush a block once its uncompressed payload reaches this many bytes
    pub block_byte_limit: usize,
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self { compression: Compression::Null, block_object_limit: 1000, block_byte_limit: 64 * 1024 }
    }
}

impl ContainerOptions {
    pub fn validate(&self) -> Result<()> {
        if self.block_object_limit == 0 || self.block_byte_limit == 0 {
            return Err(CodecError::config("container block limits must be greater than zero"));
        }
        Ok(())
    }
}

/// Top-level settings document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub codec: CodecOptions,
    pub container: ContainerOptions,
}

impl Settings {
    /// Parse and validate settings from YAML text.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let settings: Settings = serde_yaml_ng::from_str(yaml)
            .map_err(|e| CodecError::config(format!("YAML parsing failed: {e}")))?;
        settings.codec.validate()?;
        settings.container.validate()?;
        Ok(settings)
    }
}
