use std::str::FromStr;

use crate::error::{Error, Result};

pub fn normalize_env_value(raw: String) -> String {
    let trimmed = raw.trim();

    if let Some(inner) = trimmed.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        return inner.trim().to_string();
    }
    if let Some(inner) = trimmed.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
        return inner.trim().to_string();
    }

    trimmed.to_string()
}

pub fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(normalize_env_value)
        .filter(|s| !s.is_empty())
}

pub fn env_parse<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env_string(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| Error::Internal(format!("{key} has an invalid value: {raw}"))),
        None => Ok(default),
    }
}
