//! Platform biometric gate
//!
//! A capability the platform provides, consulted by the protection manager:
//! - Android: BiometricPrompt
//! - iOS/macOS: LocalAuthentication (Touch ID / Face ID)
//! - Windows: Windows Hello
//! - Linux: usually none
//!
//! The gate holds no credential state. It answers "is a sensor there" and
//! "did the user just pass a liveness check".

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Supported platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// Android
    Android,
    /// iOS
    Ios,
    /// macOS
    MacOs,
    /// Windows
    Windows,
    /// Linux
    Linux,
    /// Unknown platform
    Unknown,
}

impl Platform {
    /// Platform this build runs on
    pub fn current() -> Self {
        match std::env::consts::OS {
            "android" => Platform::Android,
            "ios" => Platform::Ios,
            "macos" => Platform::MacOs,
            "windows" => Platform::Windows,
            "linux" => Platform::Linux,
            _ => Platform::Unknown,
        }
    }

    /// The OS offers a biometric API a native bridge could call
    pub fn has_biometric_api(&self) -> bool {
        !matches!(self, Platform::Linux | Platform::Unknown)
    }
}

/// Gate used when the embedding app supplies no native bridge.
///
/// Always the [`UnsupportedBiometricGate`]. On platforms that do have a
/// biometric API the missing bridge is logged, since users there expect the
/// option.
pub fn fallback_gate(platform: Platform) -> Arc<dyn BiometricGate> {
    if platform.has_biometric_api() {
        tracing::warn!(
            "No biometric bridge supplied on {:?}; biometric unlock disabled",
            platform
        );
    } else {
        tracing::debug!("{:?} has no biometric API", platform);
    }
    Arc::new(UnsupportedBiometricGate)
}

/// Biometric modality
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiometricType {
    /// Fingerprint sensor
    Fingerprint,
    /// Face recognition
    Face,
    /// Iris scanner
    Iris,
    /// Unavailable
    None,
}

/// Sensor availability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BiometricAvailability {
    /// A sensor is present and enrolled
    pub available: bool,
    /// Which modality
    pub modality: BiometricType,
}

impl BiometricAvailability {
    /// No sensor
    pub const UNAVAILABLE: Self = Self {
        available: false,
        modality: BiometricType::None,
    };
}

/// Result of a biometric prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BiometricOutcome {
    /// Liveness check passed
    Success,
    /// Wrong biometric
    Failed,
    /// User dismissed the prompt
    Cancelled,
    /// No sensor on this platform
    NotAvailable,
    /// Platform error
    Error(String),
}

impl BiometricOutcome {
    /// Only `Success` grants anything
    pub fn is_success(&self) -> bool {
        matches!(self, BiometricOutcome::Success)
    }
}

/// Platform biometric abstraction.
///
/// Implementations bridge to native code. `authenticate` suspends until the
/// sensor answers or the user cancels.
#[async_trait]
pub trait BiometricGate: Send + Sync {
    /// Sensor availability
    async fn availability(&self) -> BiometricAvailability;

    /// Show a prompt and wait for the outcome
    async fn authenticate(&self, prompt: &str) -> BiometricOutcome;

    /// `authenticate` collapsed to a yes/no; anything but success is `false`
    async fn authenticate_bool(&self, prompt: &str) -> bool {
        let outcome = self.authenticate(prompt).await;
        if !outcome.is_success() {
            tracing::debug!("Biometric prompt did not succeed: {:?}", outcome);
        }
        outcome.is_success()
    }
}

/// Gate for platforms without a sensor. Never prompts, never blocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedBiometricGate;

#[async_trait]
impl BiometricGate for UnsupportedBiometricGate {
    async fn availability(&self) -> BiometricAvailability {
        BiometricAvailability::UNAVAILABLE
    }

    async fn authenticate(&self, _prompt: &str) -> BiometricOutcome {
        BiometricOutcome::NotAvailable
    }
}

/// Mock gate for testing and platforms without native integration
pub struct MockBiometricGate {
    modality: BiometricType,
    outcome: Mutex<BiometricOutcome>,
    prompts: AtomicUsize,
    last_prompt: Mutex<Option<String>>,
    hang: bool,
}

impl MockBiometricGate {
    /// Fingerprint sensor that always succeeds
    pub fn new() -> Self {
        Self::with_outcome(BiometricType::Fingerprint, BiometricOutcome::Success)
    }

    /// Sensor of `modality` answering every prompt with `outcome`
    pub fn with_outcome(modality: BiometricType, outcome: BiometricOutcome) -> Self {
        Self {
            modality,
            outcome: Mutex::new(outcome),
            prompts: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
            hang: false,
        }
    }

    /// Sensor whose prompt never returns (user walked away)
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::new()
        }
    }

    /// Change the scripted outcome
    pub fn set_outcome(&self, outcome: BiometricOutcome) {
        *self.outcome.lock() = outcome;
    }

    /// Number of prompts shown
    pub fn prompt_count(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }

    /// Text of the most recent prompt
    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().clone()
    }
}

impl Default for MockBiometricGate {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BiometricGate for MockBiometricGate {
    async fn availability(&self) -> BiometricAvailability {
        BiometricAvailability {
            available: self.modality != BiometricType::None,
            modality: self.modality,
        }
    }

    async fn authenticate(&self, prompt: &str) -> BiometricOutcome {
        if self.modality == BiometricType::None {
            return BiometricOutcome::NotAvailable;
        }
        self.prompts.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock() = Some(prompt.to_string());
        if self.hang {
            std::future::pending::<()>().await;
        }
        self.outcome.lock().clone()
    }
}
