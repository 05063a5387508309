//! Access control for protected notes and the hidden-notes area
//!
//! Each scope is either unprotected or protected by a password, a biometric
//! check, or both. When both are configured the biometric prompt runs first
//! and a pass skips the password entirely; the password is the fallback.
//!
//! Credential reads on the authentication path run on the blocking pool,
//! like the KDF, because the preference store may be a SQLite file.
//!
//! Authentication never returns an error. Every failure (wrong password,
//! cancelled prompt, storage fault, crypto fault) is the same `false`, so a
//! caller cannot tell the causes apart.

use crate::biometric::{BiometricAvailability, BiometricGate};
use crate::credentials::{CredentialRecord, CredentialStore, ProtectionScope, SecurityQuestion};
use crate::security::{generate_salt, KeyDerivation};
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use zeroize::Zeroizing;

/// Prompt key for the hidden-notes area
pub const PROMPT_HIDDEN_NOTES: &str = "biometric.prompt.hidden_notes";

/// Prompt key for a single note
pub const PROMPT_NOTE: &str = "biometric.prompt.note";

/// Translates prompt keys into user-facing text
pub type Localizer = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// English fallback used when the platform supplies no localizer
pub fn default_localizer() -> Localizer {
    Arc::new(|key: &str| match key {
        PROMPT_HIDDEN_NOTES => "Unlock hidden notes".to_string(),
        PROMPT_NOTE => "Unlock protected note".to_string(),
        other => other.to_string(),
    })
}

/// Protection state of a scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectionState {
    /// No password, no biometric
    Unprotected,
    /// At least one factor configured
    Protected {
        /// A password hash is stored
        has_password: bool,
        /// Biometric unlock enabled
        use_biometric: bool,
    },
}

impl ProtectionState {
    /// Anything configured
    pub fn is_protected(&self) -> bool {
        matches!(self, ProtectionState::Protected { .. })
    }
}

fn normalize_answer(answer: &str) -> Zeroizing<String> {
    Zeroizing::new(answer.trim().to_lowercase())
}

/// Protection manager
pub struct ProtectionManager {
    credentials: CredentialStore,
    biometric: Arc<dyn BiometricGate>,
    kdf: KeyDerivation,
    localizer: Localizer,
    biometric_timeout: Duration,
}

impl ProtectionManager {
    /// Create manager
    pub fn new(
        credentials: CredentialStore,
        biometric: Arc<dyn BiometricGate>,
        biometric_timeout: Duration,
    ) -> Self {
        Self {
            credentials,
            biometric,
            kdf: KeyDerivation,
            localizer: default_localizer(),
            biometric_timeout,
        }
    }

    /// Use the platform's localizer for prompt text
    pub fn with_localizer(mut self, localizer: Localizer) -> Self {
        self.localizer = localizer;
        self
    }

    /// Underlying credential store
    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// Sensor availability
    pub async fn biometric_availability(&self) -> BiometricAvailability {
        self.biometric.availability().await
    }

    async fn read_credentials(&self, scope: &ProtectionScope) -> Result<CredentialRecord> {
        let credentials = self.credentials.clone();
        let scope = scope.clone();
        tokio::task::spawn_blocking(move || credentials.get(&scope)).await?
    }

    async fn read_security_question(&self) -> Result<Option<SecurityQuestion>> {
        let credentials = self.credentials.clone();
        tokio::task::spawn_blocking(move || credentials.get_security_question()).await?
    }

    /// Current state of a scope. One short key-value read on the caller's
    /// thread.
    pub fn get_protection_state(&self, scope: &ProtectionScope) -> Result<ProtectionState> {
        let record = self.credentials.get(scope)?;
        Ok(if record.is_unprotected() {
            ProtectionState::Unprotected
        } else {
            ProtectionState::Protected {
                has_password: record.has_password(),
                use_biometric: record.use_biometric,
            }
        })
    }

    /// Set or replace the password; the biometric flag is left as is
    pub async fn set_password(&self, scope: &ProtectionScope, password: &str) -> Result<()> {
        if password.is_empty() {
            return Err(Error::Validation("Password must not be empty".to_string()));
        }
        let salt = generate_salt();
        let derived = self.kdf.derive(password, &salt).await;
        if derived.degraded {
            // A degraded hash would never verify once the KDF is back
            return Err(Error::CryptoUnavailable(format!(
                "refusing to store degraded credential for {}",
                scope
            )));
        }
        self.credentials.set_password(scope, &derived.hash, &salt)?;
        tracing::info!("Password set for {}", scope);
        Ok(())
    }

    /// Enable or disable biometric unlock
    pub fn set_biometric(&self, scope: &ProtectionScope, enabled: bool) -> Result<()> {
        self.credentials.set_biometric(scope, enabled)?;
        tracing::info!("Biometric unlock {} for {}", if enabled { "enabled" } else { "disabled" }, scope);
        Ok(())
    }

    /// Remove every credential of a scope
    pub fn clear_protection(&self, scope: &ProtectionScope) -> Result<()> {
        self.credentials.clear(scope)?;
        tracing::info!("Protection cleared for {}", scope);
        Ok(())
    }

    /// Gate entry to a scope
    pub async fn authenticate(&self, scope: &ProtectionScope, password: Option<&str>) -> bool {
        let record = match self.read_credentials(scope).await {
            Ok(record) => record,
            Err(e) => {
                tracing::error!("Credential read failed for {}: {}", scope, e);
                return false;
            }
        };

        if record.is_unprotected() {
            return true;
        }

        if record.use_biometric && self.try_biometric(scope).await {
            tracing::debug!("Biometric unlock granted for {}", scope);
            return true;
        }

        match (password, record.hash.as_deref()) {
            (Some(password), Some(hash)) => {
                if record.is_legacy() {
                    tracing::warn!(
                        target: "notebox::security",
                        "{} still uses a legacy unsalted credential",
                        scope
                    );
                }
                let granted = self
                    .kdf
                    .verify(password, hash, record.salt.as_deref())
                    .await;
                if !granted {
                    tracing::debug!("Password rejected for {}", scope);
                }
                granted
            }
            _ => false,
        }
    }

    async fn try_biometric(&self, scope: &ProtectionScope) -> bool {
        let key = match scope {
            ProtectionScope::HiddenNotes => PROMPT_HIDDEN_NOTES,
            ProtectionScope::Note(_) => PROMPT_NOTE,
        };
        let prompt = (self.localizer)(key);
        match tokio::time::timeout(self.biometric_timeout, self.biometric.authenticate_bool(&prompt)).await {
            Ok(passed) => passed,
            Err(_) => {
                tracing::warn!("Biometric prompt for {} timed out", scope);
                false
            }
        }
    }

    /// Store the recovery question with a salted hash of the normalized answer
    pub async fn set_security_question(&self, question: &str, answer: &str) -> Result<()> {
        let question = question.trim();
        let normalized = normalize_answer(answer);
        if question.is_empty() || normalized.is_empty() {
            return Err(Error::Validation(
                "Security question and answer must not be empty".to_string(),
            ));
        }
        let salt = generate_salt();
        let derived = self.kdf.derive(&normalized, &salt).await;
        if derived.degraded {
            return Err(Error::CryptoUnavailable(
                "refusing to store degraded security answer".to_string(),
            ));
        }
        self.credentials.set_security_question(&SecurityQuestion {
            question: question.to_string(),
            answer_hash: derived.hash,
            answer_salt: salt,
        })?;
        tracing::info!("Security question set");
        Ok(())
    }

    /// Check a recovery answer. A match only entitles the caller to reset the
    /// password; it does not unlock anything here.
    pub async fn verify_security_answer(&self, answer: &str) -> bool {
        let entry = match self.read_security_question().await {
            Ok(Some(entry)) => entry,
            Ok(None) => return false,
            Err(e) => {
                tracing::error!("Security question read failed: {}", e);
                return false;
            }
        };
        let normalized = normalize_answer(answer);
        self.kdf
            .verify(&normalized, &entry.answer_hash, Some(&entry.answer_salt))
            .await
    }

    /// The stored question text, for display
    pub fn security_question(&self) -> Option<String> {
        match self.credentials.get_security_question() {
            Ok(entry) => entry.map(|e| e.question),
            Err(e) => {
                tracing::error!("Security question read failed: {}", e);
                None
            }
        }
    }

    /// Whether a recovery question is configured
    pub fn has_security_question(&self) -> bool {
        self.security_question().is_some()
    }

    /// Remove the recovery question
    pub fn clear_security_question(&self) -> Result<()> {
        self.credentials.clear_security_question()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biometric::{BiometricOutcome, BiometricType, MockBiometricGate};
    use crate::kv_store::MemoryKeyValueStore;

    fn manager(gate: Arc<MockBiometricGate>) -> ProtectionManager {
        let credentials = CredentialStore::new(Arc::new(MemoryKeyValueStore::new()));
        ProtectionManager::new(credentials, gate, Duration::from_secs(5))
    }

    #[test]
    fn test_normalize_answer() {
        assert_eq!(normalize_answer("  Rex \n").as_str(), "rex");
    }

    #[tokio::test]
    async fn test_empty_password_rejected() {
        let pm = manager(Arc::new(MockBiometricGate::new()));
        let result = pm.set_password(&ProtectionScope::HiddenNotes, "").await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_localized_prompt() {
        let gate = Arc::new(MockBiometricGate::new());
        let pm = manager(gate.clone())
            .with_localizer(Arc::new(|key: &str| format!("[fr] {}", key)));
        let scope = ProtectionScope::note("n1");
        pm.set_biometric(&scope, true).unwrap();

        assert!(pm.authenticate(&scope, None).await);
        assert_eq!(gate.last_prompt().as_deref(), Some("[fr] biometric.prompt.note"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_prompt_times_out_to_denied() {
        let gate = Arc::new(MockBiometricGate::hanging());
        let pm = manager(gate.clone());
        let scope = ProtectionScope::HiddenNotes;
        pm.set_biometric(&scope, true).unwrap();

        assert!(!pm.authenticate(&scope, None).await);
        assert_eq!(gate.prompt_count(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_prompt_falls_back_to_password() {
        let gate = Arc::new(MockBiometricGate::with_outcome(
            BiometricType::Face,
            BiometricOutcome::Cancelled,
        ));
        let pm = manager(gate);
        let scope = ProtectionScope::HiddenNotes;
        pm.set_password(&scope, "pw").await.unwrap();
        pm.set_biometric(&scope, true).unwrap();

        assert!(!pm.authenticate(&scope, None).await);
        assert!(pm.authenticate(&scope, Some("pw")).await);
    }
}
