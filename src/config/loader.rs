//! Filter file loading from disk.

use std::path::Path;
use thiserror::Error;
use tokio::fs;

use crate::chain::filter::AddressFilter;
use crate::config::schema::FilterConfig;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConfigError {
    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ConfigError::Io(_) => "read_error",
            ConfigError::Parse(_) => "parse_error",
        }
    }
}

/// Parse the JSON contents of a filter file.
pub fn parse_filter_config(content: &str) -> Result<FilterConfig, ConfigError> {
    Ok(serde_json::from_str(content)?)
}

/// Load a filter config from a JSON file.
pub async fn load_filter_config(path: &Path) -> Result<FilterConfig, ConfigError> {
    let content = fs::read_to_string(path).await?;
    parse_filter_config(&content)
}

/// Load the file and build the filter it describes.
pub async fn load_address_filter(path: &Path) -> Result<AddressFilter, ConfigError> {
    load_filter_config(path).await.map(AddressFilter::from)
}
