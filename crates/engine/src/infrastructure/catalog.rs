//! Game content loading.
//!
//! The catalog is plain JSON. A default world ships inside the binary; a
//! deployment can point `CATALOG_PATH` at its own file.

use std::path::Path;

use questline_domain::Catalog;

const BUILTIN_CATALOG: &str = include_str!("../../data/catalog.json");

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Failed to read catalog {path}: {message}")]
    Io { path: String, message: String },
    #[error("Invalid catalog: {0}")]
    Invalid(String),
}

/// The catalog compiled into the binary.
pub fn builtin_catalog() -> Result<Catalog, CatalogError> {
    parse_catalog(BUILTIN_CATALOG)
}

pub fn parse_catalog(json: &str) -> Result<Catalog, CatalogError> {
    serde_json::from_str(json).map_err(|e| CatalogError::Invalid(e.to_string()))
}

pub async fn load_catalog(path: &Path) -> Result<Catalog, CatalogError> {
    let json = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| CatalogError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
    let catalog = parse_catalog(&json)?;
    tracing::info!(path = %path.display(), "Loaded catalog");
    Ok(catalog)
}
