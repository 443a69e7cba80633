use crate::types::Config;
use anyhow::Result;
use std::fs;
use std::path::Path;

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// A missing config file is not an error; the built-in defaults carry
    /// the reference thresholds and a usable local setup.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}
