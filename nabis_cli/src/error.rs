use nabis::error::NabisError;
use polars::error::PolarsError;

#[derive(thiserror::Error, Debug)]
pub enum NabisCliError {
    #[error("Anyhow error: {0:#}")]
    Anyhow(#[from] anyhow::Error),
    #[error("serde JSON error: {0}")]
    SerdeJSONError(#[from] serde_json::Error),
    #[error("polars error: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("nabis error: {0}")]
    NabisError(#[from] NabisError),
    #[error("std IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid TOML in config file: {0}")]
    TomlError(#[from] toml::de::Error),
}

pub type NabisCliResult<T> = Result<T, NabisCliError>;
