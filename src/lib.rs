use thiserror::Error;

pub type Result<T> = std::result::Result<T, CatalogError>;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cannot reach the vector store: {0}")]
    Connection(String),

    #[error("Collection '{0}' does not exist; run `catalog-kb schema create` first")]
    MissingCollection(String),

    #[error("Store error: {0}")]
    Store(#[from] store::StoreError),

    #[error(transparent)]
    Source(#[from] sources::SourceError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod commands;
pub mod config;
pub mod metadata;
pub mod query;
pub mod schema;
pub mod sources;
pub mod store;
pub mod upload;
