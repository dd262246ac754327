//! Short-lived secret values

use std::fmt;

use zeroize::Zeroize;

use crate::error::{ConfigError, Result};

/// A write-once secret string.
///
/// `Secret` never implements `Display`, its `Debug` output is redacted, and
/// the underlying bytes are zeroized when the value is dropped or explicitly
/// scrubbed. Callers reach the plaintext only through [`Secret::expose`].
pub struct Secret {
    value: String,
}

impl Secret {
    /// Wrap an already-obtained secret value.
    pub fn new(value: String) -> Self {
        Self { value }
    }

    /// Read a required secret from the environment.
    ///
    /// Unset and empty are both treated as missing so that CI templates with
    /// blank secret slots fail loudly instead of signing with an empty
    /// passphrase.
    pub fn from_env(name: &'static str) -> Result<Self> {
        match std::env::var(name) {
            Ok(value) if !value.is_empty() => Ok(Self::new(value)),
            Ok(_) => Err(ConfigError::MissingSecret(name)),
            Err(std::env::VarError::NotPresent) => Err(ConfigError::MissingSecret(name)),
            Err(std::env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidSecret {
                name,
                reason: "value is not valid UTF-8".to_string(),
            }),
        }
    }

    /// Borrow the plaintext secret.
    pub fn expose(&self) -> &str {
        &self.value
    }

    /// Overwrite the secret bytes in place.
    ///
    /// Dropping the value does this too; `scrub` exists for call sites that
    /// want the plaintext gone before the surrounding scope ends.
    pub fn scrub(&mut self) {
        self.value.zeroize();
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        self.value.zeroize();
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_is_redacted() {
        let secret = Secret::new("hunter2".to_string());
        assert_eq!(format!("{secret:?}"), "Secret(***)");
    }

    #[test]
    fn expose_returns_plaintext() {
        let secret = Secret::new("hunter2".to_string());
        assert_eq!(secret.expose(), "hunter2");
    }

    #[test]
    fn scrub_clears_value() {
        let mut secret = Secret::new("hunter2".to_string());
        secret.scrub();
        assert!(secret.expose().is_empty());
    }
}
