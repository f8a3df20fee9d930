//! Engine configuration from a TOML file.
//!
//! Every key is optional; missing keys keep their defaults:
//!
//! ```toml
//! buffer_size = 4194304
//! verify = true
//! checksum_algorithm = "blake3"
//! ```

use engine::EngineConfig;
use std::fs;
use std::path::Path;

/// Load `path`, or the defaults when no file is given.
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig, String> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };

    let text = fs::read_to_string(path)
        .map_err(|e| format!("Cannot read config file {}: {}", path.display(), e))?;
    parse_config(&text).map_err(|e| format!("Invalid config file {}: {}", path.display(), e))
}

pub fn parse_config(text: &str) -> Result<EngineConfig, toml::de::Error> {
    toml::from_str(text)
}
