//! Engine configuration

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{TurboError, TurboResult};

/// Where artifacts go and how generated lines end
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurboConfig {
    /// Directory beneath which `<module>_turbo/` is created
    pub output_root: PathBuf,
    /// Line terminator of generated text
    pub eol: String,
}

impl Default for TurboConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("."),
            eol: "\n".to_string(),
        }
    }
}

impl TurboConfig {
    pub fn with_output_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.output_root = root.into();
        self
    }

    /// Read a JSON config file, missing keys take their defaults
    pub fn load(path: &Path) -> TurboResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| TurboError::io(path, e))?;
        let config: TurboConfig = serde_json::from_str(&text)
            .map_err(|e| TurboError::config(format!("{}: {}", path.display(), e)))?;
        if !matches!(config.eol.as_str(), "\n" | "\r\n" | "\r") {
            return Err(TurboError::config(format!("unsupported eol {:?}", config.eol)));
        }
        Ok(config)
    }
}
