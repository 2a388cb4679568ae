use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::error::{AdError, Result};

use super::KeyValueStore;

#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<BTreeMap<String, i64>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every stored entry, ordered by key.
    #[must_use]
    pub fn entries(&self) -> Vec<(String, i64)> {
        self.values
            .lock()
            .iter()
            .map(|(key, value)| (key.clone(), *value))
            .collect()
    }

    #[must_use]
    pub fn raw(&self, key: &str) -> Option<i64> {
        self.values.lock().get(key).copied()
    }
}

impl KeyValueStore for MemoryStore {
    fn get_int(&self, key: &str, default: i32) -> Result<i32> {
        match self.values.lock().get(key) {
            Some(value) => i32::try_from(*value)
                .map_err(|_| AdError::Storage(format!("value for {key} does not fit in an int: {value}"))),
            None => Ok(default),
        }
    }

    fn put_int(&self, key: &str, value: i32) -> Result<()> {
        self.values.lock().insert(key.to_string(), i64::from(value));
        Ok(())
    }

    fn get_long(&self, key: &str, default: i64) -> Result<i64> {
        Ok(self.values.lock().get(key).copied().unwrap_or(default))
    }

    fn put_long(&self, key: &str, value: i64) -> Result<()> {
        self.values.lock().insert(key.to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_default_for_missing_keys() {
        let store = MemoryStore::new();
        assert_eq!(store.get_int("missing", 7).unwrap(), 7);
        assert_eq!(store.get_long("missing", -1).unwrap(), -1);
    }

    #[test]
    fn int_read_of_oversized_long_is_an_error() {
        let store = MemoryStore::new();
        store.put_long("big", i64::from(i32::MAX) + 1).unwrap();
        assert!(store.get_int("big", 0).is_err());
        assert_eq!(store.get_long("big", 0).unwrap(), i64::from(i32::MAX) + 1);
    }
}
