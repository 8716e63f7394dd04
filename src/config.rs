//! Pipeline configuration
//!
//! The configuration surface is small: where to write, whether to keep the
//! unmodified IR next to the rewritten one, and how to treat code that still
//! depends on the runtime's GC.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// How the GC elimination pass treats runtime-dependent code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GcPolicy {
    /// Log and continue, output unchanged
    #[default]
    Warn,
    /// Abort the whole run
    Strict,
    /// Remove GC frame scaffolding only
    Strip,
    /// Remove scaffolding and substitute `malloc` for pool allocations
    StripAll,
}

impl GcPolicy {
    /// Whether scaffolding removal runs under this policy
    pub fn strips_scaffolding(self) -> bool {
        matches!(self, GcPolicy::Strip | GcPolicy::StripAll)
    }

    /// Whether allocator substitution runs under this policy
    pub fn substitutes_allocator(self) -> bool {
        self == GcPolicy::StripAll
    }
}

impl FromStr for GcPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "warn" => Ok(GcPolicy::Warn),
            "strict" => Ok(GcPolicy::Strict),
            "strip" => Ok(GcPolicy::Strip),
            "strip_all" => Ok(GcPolicy::StripAll),
            other => Err(Error::Config(format!(
                "unknown GC policy `{}` (expected warn, strict, strip or strip_all)",
                other
            ))),
        }
    }
}

impl fmt::Display for GcPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GcPolicy::Warn => "warn",
            GcPolicy::Strict => "strict",
            GcPolicy::Strip => "strip",
            GcPolicy::StripAll => "strip_all",
        };
        f.write_str(name)
    }
}

/// Pipeline options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Also write the unmodified IR of every function for diffing
    pub debug: bool,
    /// GC elimination policy
    pub policy: GcPolicy,
    /// Directory receiving the `.ir` files
    pub output_dir: PathBuf,
    /// Skip bindings whose value cannot be encoded instead of aborting
    pub skip_unsupported_bindings: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            debug: false,
            policy: GcPolicy::Warn,
            output_dir: PathBuf::from("build"),
            skip_unsupported_bindings: true,
        }
    }
}

impl PipelineConfig {
    /// Parse a configuration from JSON; missing keys take their defaults
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load a JSON configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::from_json(&text)
    }

    /// Builder-style policy override
    pub fn with_policy(mut self, policy: GcPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Builder-style output directory override
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }
}
