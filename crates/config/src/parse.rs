// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Config file loading: HCL text → `Config`.

use crate::convert::{self, Config};
use crate::schema::ConfigFile;
use std::path::Path;
use thiserror::Error;

/// Contents written to `config.hcl` when it does not exist yet.
pub const DEFAULT_CONFIG: &str = r#"# overseer configuration
#
# Contexts are evaluated in declaration order; the first match wins.
# See the documentation for the full conditions grammar.

exports {
  dotenv = "~/.config/overseer/overseer.env"
}

ssh {
  reconnect_enabled = true
  initial_backoff   = "1s"
  max_backoff       = "5m"
  backoff_factor    = 2
  max_retries       = 10
}

context "default" {
  display_name = "Default"
}
"#;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid HCL in {path}: {message}")]
    Hcl { path: String, message: String },

    #[error("invalid configuration at {location}: {message}")]
    Invalid { location: String, message: String },
}

/// Parse configuration from HCL text. `origin` names the source in
/// errors (a path, or `<inline>` in tests).
pub fn parse_str(content: &str, origin: &str) -> Result<Config, ParseError> {
    let file: ConfigFile = hcl::from_str(content).map_err(|e| ParseError::Hcl {
        path: origin.to_string(),
        message: e.to_string(),
    })?;
    convert::convert(file)
}

/// Load and parse a configuration file.
pub fn load_file(path: &Path) -> Result<Config, ParseError> {
    let content = std::fs::read_to_string(path).map_err(|source| ParseError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_str(&content, &path.display().to_string())
}

/// Create the config file with defaults when absent. Returns whether the
/// file was created.
pub fn ensure_config_file(path: &Path) -> Result<bool, ParseError> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ParseError::Io {
            path: parent.display().to_string(),
            source,
        })?;
    }
    std::fs::write(path, DEFAULT_CONFIG).map_err(|source| ParseError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(true)
}

#[cfg(test)]
#[path = "parse_tests.rs"]
mod tests;
