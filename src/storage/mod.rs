use log::info;

use crate::{
    config::{Backend, StorageConfig},
    storage::{
        catalog::CatalogStore, db::SqliteStore, error::StorageError, fs::DirectoryStore,
        kv::{KeyValueStore, MemoryStore},
    },
};

pub mod catalog;
pub mod db;
pub mod error;
pub mod fs;
pub mod kv;
pub mod query;
pub(crate) mod schema;
mod seed;

/// Opens the configured key-value backend
pub fn open_backend(backend: &Backend) -> Result<Box<dyn KeyValueStore>, StorageError> {
    let kv: Box<dyn KeyValueStore> = match backend {
        Backend::Memory => Box::new(MemoryStore::new()),
        Backend::Directory { path } => Box::new(DirectoryStore::open(path)?),
        Backend::Sqlite { path } => Box::new(SqliteStore::open(path)?),
    };
    Ok(kv)
}

/// Opens the catalog described by the storage section of the config
pub fn open_catalog(config: &StorageConfig) -> Result<CatalogStore, StorageError> {
    info!("Opening catalog at {}", describe(&config.backend));
    let kv = open_backend(&config.backend)?;
    CatalogStore::open_with(kv, config.seed)
}

pub fn describe(backend: &Backend) -> String {
    match backend {
        Backend::Memory => "memory".to_string(),
        Backend::Directory { path } => format!("directory {}", path.to_string_lossy()),
        Backend::Sqlite { path } => format!("sqlite {}", path.to_string_lossy()),
    }
}
