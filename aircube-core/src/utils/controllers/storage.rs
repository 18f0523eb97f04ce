//! Key/value settings store used for the brightness preference.

use heapless::{String, Vec};

/// Errors from the settings store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceError {
    /// The backend could not be opened, read or written.
    Unavailable,
    /// A stored value is outside the range its reader accepts.
    OutOfRange,
}

impl core::fmt::Display for PersistenceError {
    fn fmt(
        &self,
        f: &mut core::fmt::Formatter<'_>,
    ) -> core::fmt::Result {
        match self {
            Self::Unavailable => write!(f, "settings store unavailable"),
            Self::OutOfRange => write!(f, "stored value out of range"),
        }
    }
}

/// Durable `i32` settings keyed by short names.
pub trait SettingsStore {
    /// `Ok(None)` when the key has never been written.
    fn get(
        &self,
        key: &str,
    ) -> Result<Option<i32>, PersistenceError>;

    fn set(
        &mut self,
        key: &str,
        value: i32,
    ) -> Result<(), PersistenceError>;
}

impl<S: SettingsStore> SettingsStore for &mut S {
    fn get(
        &self,
        key: &str,
    ) -> Result<Option<i32>, PersistenceError> {
        (**self).get(key)
    }

    fn set(
        &mut self,
        key: &str,
        value: i32,
    ) -> Result<(), PersistenceError> {
        (**self).set(key, value)
    }
}

const KEY_LEN: usize = 16;

/// Fixed-capacity RAM store. Useful when no flash backend is present.
#[derive(Debug, Default)]
pub struct MemoryStore<const N: usize> {
    entries: Vec<(String<KEY_LEN>, i32), N>,
}

impl<const N: usize> MemoryStore<N> {
    pub const fn new() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<const N: usize> SettingsStore for MemoryStore<N> {
    fn get(
        &self,
        key: &str,
    ) -> Result<Option<i32>, PersistenceError> {
        Ok(self
            .entries
            .iter()
            .find(|(k, _)| k.as_str() == key)
            .map(|(_, v)| *v))
    }

    fn set(
        &mut self,
        key: &str,
        value: i32,
    ) -> Result<(), PersistenceError> {
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| k.as_str() == key) {
            entry.1 = value;
            return Ok(());
        }
        let key = String::try_from(key).map_err(|_| PersistenceError::OutOfRange)?;
        self.entries
            .push((key, value))
            .map_err(|_| PersistenceError::Unavailable)
    }
}
