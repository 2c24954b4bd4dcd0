//! Engine and daemon configuration
//!
//! All tunable sizes of the protocol engine live here instead of being
//! scattered as literals across call sites. Values can be loaded from a JSON
//! document; missing fields fall back to [`Default`].

use core::fmt;

use serde::{Deserialize, Serialize};

/// Maximum length of the build tag in the `VERSION` reply.
pub const BUILD_TAG_LEN: usize = 7;

const DEFAULT_BUILD_TAG: &str = "0000000";

/// Smallest line buffer that can still hold any well-formed command.
const MIN_LINE_LEN: usize = 16;

/// Protocol version reported by `VERSION`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub major: u16,
    pub minor: u16,
    /// Short build identifier, 1 to 7 non-whitespace characters.
    pub tag: heapless::String<BUILD_TAG_LEN>,
}

impl Default for VersionInfo {
    fn default() -> Self {
        let mut tag = heapless::String::new();
        // Fits: DEFAULT_BUILD_TAG is exactly BUILD_TAG_LEN bytes.
        let _ = tag.push_str(DEFAULT_BUILD_TAG);
        Self {
            major: 0,
            minor: 1,
            tag,
        }
    }
}

impl fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.tag)
    }
}

/// Per-session engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Longest accepted command line, terminator excluded.
    pub max_line_len: usize,
    /// Size of the scratch buffer used for attribute reads and writes.
    pub attr_buf_size: usize,
    /// Largest chunk moved per backend call during READBUF/WRITEBUF.
    pub chunk_size: usize,
    pub version: VersionInfo,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_line_len: 128,
            attr_buf_size: 0x1000,
            chunk_size: 256,
            version: VersionInfo::default(),
        }
    }
}

impl EngineConfig {
    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_line_len < MIN_LINE_LEN {
            return Err(ConfigError::ValidationFailed("max_line_len below 16"));
        }
        if self.attr_buf_size == 0 {
            return Err(ConfigError::ValidationFailed("attr_buf_size is zero"));
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::ValidationFailed("chunk_size is zero"));
        }
        let tag = self.version.tag.as_str();
        if tag.is_empty() || tag.chars().any(char::is_whitespace) {
            return Err(ConfigError::ValidationFailed(
                "version tag must be 1-7 non-whitespace characters",
            ));
        }
        Ok(())
    }
}

/// Configuration of the TCP daemon binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Socket address the daemon listens on.
    pub listen_addr: String,
    /// Upper bound on concurrently served clients.
    pub max_sessions: usize,
    pub engine: EngineConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:30431".into(),
            max_sessions: 4,
            engine: EngineConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// Parse and validate a JSON configuration document.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_sessions == 0 {
            return Err(ConfigError::ValidationFailed("max_sessions is zero"));
        }
        self.engine.validate()
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The document is not valid JSON for this schema.
    Parse(String),
    /// A value is out of range.
    ValidationFailed(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(msg) => write!(f, "config parse error: {msg}"),
            Self::ValidationFailed(msg) => write!(f, "config validation failed: {msg}"),
        }
    }
}

impl core::error::Error for ConfigError {}
