//! License key generation and format checks.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Random tail length used when the configured length leaves no room after
/// the prefix.
pub const FALLBACK_TAIL_LEN: usize = 10;

pub const MIN_CUSTOM_LENGTH: usize = 8;
pub const MAX_CUSTOM_LENGTH: usize = 64;

/// Shape of a license key: `prefix` followed by random characters from
/// `charset`, `length` characters in total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyFormat {
    pub prefix: String,
    pub length: usize,
    pub charset: String,
}

impl Default for KeyFormat {
    fn default() -> Self {
        Self {
            prefix: "zz".to_string(),
            length: 18,
            charset: "abcdefghijklmnopqrstuvwxyz0123456789".to_string(),
        }
    }
}

impl KeyFormat {
    fn prefix_len(&self) -> usize {
        self.prefix.chars().count()
    }

    /// Number of random characters after the prefix.
    pub fn tail_len(&self) -> usize {
        let prefix_len = self.prefix_len();
        if self.length <= prefix_len {
            FALLBACK_TAIL_LEN
        } else {
            self.length - prefix_len
        }
    }

    /// Total length of keys produced with this format.
    pub fn key_len(&self) -> usize {
        self.prefix_len() + self.tail_len()
    }

    /// Bounds for a caller-supplied format.
    pub fn validate_custom(&self) -> Result<()> {
        if self.prefix.is_empty() {
            return Err(AppError::Validation("Key prefix must not be empty".into()));
        }
        if self.charset.is_empty() {
            return Err(AppError::Validation("Key charset must not be empty".into()));
        }
        if !(MIN_CUSTOM_LENGTH..=MAX_CUSTOM_LENGTH).contains(&self.length) {
            return Err(AppError::Validation(format!(
                "Key length must be between {} and {}",
                MIN_CUSTOM_LENGTH, MAX_CUSTOM_LENGTH
            )));
        }
        Ok(())
    }
}

/// Generate a key: the prefix, then characters drawn uniformly from the charset.
pub fn generate_key(format: &KeyFormat) -> Result<String> {
    let charset: Vec<char> = format.charset.chars().collect();
    if charset.is_empty() {
        return Err(AppError::Config("License key charset is empty".into()));
    }

    let mut rng = rand::thread_rng();
    let mut key = String::with_capacity(format.prefix.len() + format.tail_len());
    key.push_str(&format.prefix);
    for _ in 0..format.tail_len() {
        key.push(charset[rng.gen_range(0..charset.len())]);
    }
    Ok(key)
}

/// Whether `key` could have been produced by [`generate_key`] with `format`.
pub fn validate_key_format(key: &str, format: &KeyFormat) -> bool {
    let Some(tail) = key.strip_prefix(format.prefix.as_str()) else {
        return false;
    };
    key.chars().count() == format.key_len() && tail.chars().all(|c| format.charset.contains(c))
}
