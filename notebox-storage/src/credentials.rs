//! Credential persistence
//!
//! Hash, salt and biometric flag per protection scope, plus the single
//! security question, stored under namespaced keys in a [`KeyValueStore`].

use crate::kv_store::KeyValueStore;
use crate::Result;
use std::fmt;
use std::sync::Arc;

const SECURITY_QUESTION_KEY: &str = "security_question";
const SECURITY_ANSWER_HASH_KEY: &str = "security_answer_hash";
const SECURITY_ANSWER_SALT_KEY: &str = "security_answer_salt";

/// Access-control boundary
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProtectionScope {
    /// The global hidden-notes area
    HiddenNotes,
    /// One note, by id
    Note(String),
}

impl ProtectionScope {
    /// Scope for a note id
    pub fn note(id: impl Into<String>) -> Self {
        ProtectionScope::Note(id.into())
    }

    /// Key namespace for this scope
    pub fn key_prefix(&self) -> String {
        match self {
            ProtectionScope::HiddenNotes => "hidden_notes".to_string(),
            ProtectionScope::Note(id) => format!("protected_note_{}", id),
        }
    }

    fn password_key(&self) -> String {
        format!("{}_password", self.key_prefix())
    }

    fn salt_key(&self) -> String {
        format!("{}_salt", self.key_prefix())
    }

    fn biometric_key(&self) -> String {
        format!("{}_use_biometric", self.key_prefix())
    }
}

impl fmt::Display for ProtectionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtectionScope::HiddenNotes => f.write_str("hidden notes"),
            ProtectionScope::Note(id) => write!(f, "note {}", id),
        }
    }
}

/// Stored credential for one scope
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialRecord {
    /// Verification hash
    pub hash: Option<String>,
    /// Salt; `None` with a hash present means the legacy format
    pub salt: Option<String>,
    /// Biometric unlock enabled
    pub use_biometric: bool,
}

impl CredentialRecord {
    /// A password hash is stored
    pub fn has_password(&self) -> bool {
        self.hash.is_some()
    }

    /// Neither password nor biometric
    pub fn is_unprotected(&self) -> bool {
        !self.has_password() && !self.use_biometric
    }

    /// Hash predates salting
    pub fn is_legacy(&self) -> bool {
        self.hash.is_some() && self.salt.is_none()
    }
}

/// Stored security question
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityQuestion {
    /// Question text
    pub question: String,
    /// Hash of the normalized answer
    pub answer_hash: String,
    /// Salt used for the answer hash
    pub answer_salt: String,
}

/// Credential store over a key-value backend
#[derive(Clone)]
pub struct CredentialStore {
    kv: Arc<dyn KeyValueStore>,
}

impl CredentialStore {
    /// Create over a key-value store
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Read the credential for a scope
    pub fn get(&self, scope: &ProtectionScope) -> Result<CredentialRecord> {
        Ok(CredentialRecord {
            hash: self.kv.get(&scope.password_key())?,
            salt: self.kv.get(&scope.salt_key())?,
            use_biometric: self.kv.get(&scope.biometric_key())?.as_deref() == Some("true"),
        })
    }

    /// Store hash and salt together
    pub fn set_password(&self, scope: &ProtectionScope, hash: &str, salt: &str) -> Result<()> {
        self.kv.set_many(&[
            (scope.password_key().as_str(), hash),
            (scope.salt_key().as_str(), salt),
        ])
    }

    /// Set the biometric flag
    pub fn set_biometric(&self, scope: &ProtectionScope, enabled: bool) -> Result<()> {
        self.kv
            .set(&scope.biometric_key(), if enabled { "true" } else { "false" })
    }

    /// Remove hash, salt and biometric flag in one batch
    pub fn clear(&self, scope: &ProtectionScope) -> Result<()> {
        self.kv.remove_many(&[
            scope.password_key().as_str(),
            scope.salt_key().as_str(),
            scope.biometric_key().as_str(),
        ])
    }

    /// Read the security question, if one is fully stored
    pub fn get_security_question(&self) -> Result<Option<SecurityQuestion>> {
        let question = self.kv.get(SECURITY_QUESTION_KEY)?;
        let answer_hash = self.kv.get(SECURITY_ANSWER_HASH_KEY)?;
        let answer_salt = self.kv.get(SECURITY_ANSWER_SALT_KEY)?;
        Ok(match (question, answer_hash, answer_salt) {
            (Some(question), Some(answer_hash), Some(answer_salt)) => Some(SecurityQuestion {
                question,
                answer_hash,
                answer_salt,
            }),
            _ => None,
        })
    }

    /// Store the security question triple
    pub fn set_security_question(&self, entry: &SecurityQuestion) -> Result<()> {
        self.kv.set_many(&[
            (SECURITY_QUESTION_KEY, entry.question.as_str()),
            (SECURITY_ANSWER_HASH_KEY, entry.answer_hash.as_str()),
            (SECURITY_ANSWER_SALT_KEY, entry.answer_salt.as_str()),
        ])
    }

    /// Remove the security question triple
    pub fn clear_security_question(&self) -> Result<()> {
        self.kv.remove_many(&[
            SECURITY_QUESTION_KEY,
            SECURITY_ANSWER_HASH_KEY,
            SECURITY_ANSWER_SALT_KEY,
        ])
    }
}
