use std::fmt;

use super::model_config::ModelConfig;

/// A decrypted provider credential.
///
/// Only the transport reads the plaintext, through [`SecretKey::expose`].
/// `Debug` output is redacted so the key cannot end up in logs by accident.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey(String);

impl SecretKey {
    pub fn new(plain: impl Into<String>) -> Self {
        Self(plain.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

/// A model config plus the credential resolved for the current caller.
/// This is what the client hands to the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedModel {
    pub config: ModelConfig,
    pub api_key: Option<SecretKey>,
}
