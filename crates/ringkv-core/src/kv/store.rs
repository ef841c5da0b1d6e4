//! Local in-memory store.
//!
//! Plain key/value map with CRUD validation. Last write wins; there is no
//! versioning and deletes leave no tombstone.

use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Key is empty")]
    EmptyKey,

    #[error("Value is empty")]
    EmptyValue,

    #[error("Key already exists: {0}")]
    KeyExists(String),

    #[error("Key not found: {0}")]
    KeyNotFound(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Default)]
pub struct LocalStore {
    entries: BTreeMap<String, String>,
}

impl LocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, key: &str, value: &str) -> Result<()> {
        check_key(key)?;
        check_value(value)?;
        if self.entries.contains_key(key) {
            return Err(StoreError::KeyExists(key.to_string()));
        }
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    pub fn read(&self, key: &str) -> Result<&str> {
        check_key(key)?;
        match self.entries.get(key) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(StoreError::KeyNotFound(key.to_string())),
        }
    }

    pub fn update(&mut self, key: &str, value: &str) -> Result<()> {
        check_key(key)?;
        check_value(value)?;
        match self.entries.get_mut(key) {
            Some(existing) => {
                *existing = value.to_string();
                Ok(())
            }
            None => Err(StoreError::KeyNotFound(key.to_string())),
        }
    }

    /// Remove a key, returning its value.
    pub fn delete(&mut self, key: &str) -> Result<String> {
        check_key(key)?;
        self.entries
            .remove(key)
            .ok_or_else(|| StoreError::KeyNotFound(key.to_string()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

fn check_key(key: &str) -> Result<()> {
    if key.is_empty() {
        Err(StoreError::EmptyKey)
    } else {
        Ok(())
    }
}

fn check_value(value: &str) -> Result<()> {
    if value.is_empty() {
        Err(StoreError::EmptyValue)
    } else {
        Ok(())
    }
}
