//! SQLite backend keeping every key in a single table

use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};

use crate::storage::{
    error::StorageError,
    kv::KeyValueStore,
    schema::{self, *},
};

pub struct SqliteStore {
    pub(crate) db: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::from_existing_conn(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::from_existing_conn(Connection::open_in_memory()?)
    }

    pub fn from_existing_conn(db: Connection) -> Result<Self, StorageError> {
        schema::init(&db)?;
        Ok(Self { db })
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let value = self
            .db
            .query_row(
                &format!("SELECT {VALUE} FROM {KV} WHERE {KEY} = ?1"),
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.db.execute(
            &format!(
                "INSERT INTO {KV} ({KEY}, {VALUE}) VALUES (?1, ?2)
                 ON CONFLICT({KEY}) DO UPDATE SET {VALUE} = excluded.{VALUE}"
            ),
            params![key, value],
        )?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.db
            .execute(&format!("DELETE FROM {KV} WHERE {KEY} = ?1"), params![key])?;
        Ok(())
    }
}
