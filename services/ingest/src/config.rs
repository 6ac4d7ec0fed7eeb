//! Environment configuration
//!
//! Every source path comes from here. Nothing in the pipelines hard-codes a
//! filesystem location: a missing setting is a configuration error at
//! startup, not a buried constant.

use anyhow::{Context, Result};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub db_url: String,
    /// Root of the extracted corpus; all catalog CSV paths resolve under it.
    pub data_dir: PathBuf,
    /// Archive manifest location.
    pub manifest: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let db_url = std::env::var("DB_URL").context("DB_URL env var missing")?;
        let data_dir = PathBuf::from(
            std::env::var("DATA_DIR").context("DATA_DIR env var missing")?,
        );
        let manifest = std::env::var("MANIFEST")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("manifest.json"));
        Ok(Self { db_url, data_dir, manifest })
    }
}
