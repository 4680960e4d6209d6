//! Shared test utilities for serialising environment mutation.

use std::env;
use std::ffi::OsString;

use tokio::sync::{Mutex, MutexGuard};

/// Serialises tests that read or write process environment variables.
pub static ENV_LOCK: Mutex<()> = Mutex::const_new(());

/// Guard that holds the env mutex and restores the touched variables on drop.
pub struct EnvGuard {
    saved: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Takes the env mutex without touching any variable.
    pub async fn lock() -> Self {
        Self {
            saved: Vec::new(),
            _guard: ENV_LOCK.lock().await,
        }
    }

    /// Sets an environment variable for the lifetime of the guard.
    pub fn set_var(&mut self, key: &str, value: &str) -> &mut Self {
        self.remember(key);
        unsafe { env::set_var(key, value) };
        self
    }

    /// Removes an environment variable for the lifetime of the guard.
    pub fn remove_var(&mut self, key: &str) -> &mut Self {
        self.remember(key);
        unsafe { env::remove_var(key) };
        self
    }

    fn remember(&mut self, key: &str) {
        if self.saved.iter().all(|(saved, _)| saved != key) {
            self.saved.push((key.to_owned(), env::var_os(key)));
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in self.saved.drain(..).rev() {
            match value {
                Some(value) => unsafe { env::set_var(&key, value) },
                None => unsafe { env::remove_var(&key) },
            }
        }
    }
}
