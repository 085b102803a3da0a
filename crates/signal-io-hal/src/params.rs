//! `backend:key=value,key=value` configuration strings
//!
//! The grammar used by the bundled backends. Other backends are free to interpret
//! their configuration string however they like.

use crate::{Result, SignalIoError};
use std::collections::BTreeMap;
use std::str::FromStr;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceParams {
    backend: Option<String>,
    values: BTreeMap<String, String>,
}

impl DeviceParams {
    /// Parse a configuration string
    pub fn parse(config: &str) -> Result<Self> {
        let config = config.trim();
        let (backend, body) = match split_backend(config) {
            Some((backend, body)) => (Some(backend.to_string()), body),
            None => (None, config),
        };

        let mut values = BTreeMap::new();
        for pair in body.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                SignalIoError::InvalidConfig(format!("expected key=value, got '{pair}'"))
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(SignalIoError::InvalidConfig(format!(
                    "empty key in '{pair}'"
                )));
            }
            if values
                .insert(key.to_lowercase(), value.trim().to_string())
                .is_some()
            {
                return Err(SignalIoError::InvalidConfig(format!(
                    "duplicate key '{key}'"
                )));
            }
        }

        Ok(Self { backend, values })
    }

    /// Backend prefix, if the string carried one
    pub fn backend(&self) -> Option<&str> {
        self.backend.as_deref()
    }

    /// Raw value of a key
    pub fn raw(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Parse the value of a key
    pub fn get<T: FromStr>(&self, key: &str) -> Result<Option<T>> {
        self.raw(key)
            .map(|raw| {
                raw.parse().map_err(|_| {
                    SignalIoError::InvalidConfig(format!("invalid value '{raw}' for '{key}'"))
                })
            })
            .transpose()
    }

    pub fn get_or<T: FromStr>(&self, key: &str, default: T) -> Result<T> {
        Ok(self.get(key)?.unwrap_or(default))
    }

    /// Reject keys the backend does not understand
    pub fn ensure_known(&self, known: &[&str]) -> Result<()> {
        match self.values.keys().find(|k| !known.contains(&k.as_str())) {
            Some(key) => Err(SignalIoError::InvalidConfig(format!("unknown key '{key}'"))),
            None => Ok(()),
        }
    }

    /// Require the backend prefix, when present, to be `name`
    pub fn ensure_backend(&self, name: &str) -> Result<()> {
        match self.backend() {
            Some(backend) if !backend.eq_ignore_ascii_case(name) => Err(
                SignalIoError::InvalidConfig(format!("configuration is for backend '{backend}'")),
            ),
            _ => Ok(()),
        }
    }
}

/// Split off the `backend:` prefix of a configuration string
pub fn split_backend(config: &str) -> Option<(&str, &str)> {
    let (backend, body) = config.split_once(':')?;
    let backend = backend.trim();
    if backend.is_empty() || backend.contains('=') || backend.contains(',') {
        return None;
    }
    Some((backend, body))
}
