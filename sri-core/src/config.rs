//! Configuration, environment selection and issuer identity.
use serde::{Deserialize, Serialize};
use std::{fmt, path::{Path, PathBuf}, str::FromStr, time::Duration};
use thiserror::Error;

use crate::document::AccountingObligation;

/// SRI operating environment.
/// This selects the web service endpoints and is also written into every access key
/// and every `infoTributaria` block.
/// - Test: what the SRI calls "pruebas" (`celcer.sri.gob.ec`).
/// - Production: the live environment (`cel.sri.gob.ec`).
/// # Examples
/// ```rust
/// use std::str::FromStr;
/// use sri_core::config::Environment;
///
/// let env = Environment::from_str("pruebas")?;
/// assert_eq!(env, Environment::Test);
/// assert_eq!(env.code(), "1");
/// # Ok::<(), sri_core::config::EnvironmentParseError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Environment {
    #[serde(rename = "1")]
    Test,
    #[serde(rename = "2")]
    Production,
}

/// Error returned when parsing an [`Environment`] from a string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvironmentParseError {
    #[error("invalid environment: {input}")]
    Invalid { input: String },
}

impl FromStr for Environment {
    type Err = EnvironmentParseError;
    fn from_str(env: &str) -> Result<Environment, EnvironmentParseError> {
        match env.trim().to_ascii_lowercase().as_str() {
            "1" | "test" | "pruebas" => Ok(Environment::Test),
            "2" | "production" | "produccion" => Ok(Environment::Production),
            _ => Err(EnvironmentParseError::Invalid {
                input: env.to_string(),
            }),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Test => "test",
            Environment::Production => "production",
        }
    }

    /// Single digit written into access keys and `<ambiente>`.
    pub fn code(&self) -> &'static str {
        match self {
            Environment::Test => "1",
            Environment::Production => "2",
        }
    }

    pub fn reception_url(&self) -> &'static str {
        match self {
            Environment::Test => {
                "https://celcer.sri.gob.ec/comprobantes-electronicos-ws/RecepcionComprobantesOffline?wsdl"
            }
            Environment::Production => {
                "https://cel.sri.gob.ec/comprobantes-electronicos-ws/RecepcionComprobantesOffline?wsdl"
            }
        }
    }

    pub fn authorization_url(&self) -> &'static str {
        match self {
            Environment::Test => {
                "https://celcer.sri.gob.ec/comprobantes-electronicos-ws/AutorizacionComprobantesOffline?wsdl"
            }
            Environment::Production => {
                "https://cel.sri.gob.ec/comprobantes-electronicos-ws/AutorizacionComprobantesOffline?wsdl"
            }
        }
    }
}

/// Default bound for a single reception or authorization call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(15_000);

/// Configuration for the issuance pipeline and the submission state machine.
///
/// # Examples
/// ```rust
/// use std::time::Duration;
/// use sri_core::config::{Config, Environment};
///
/// let config = Config::new(Environment::Test).with_request_timeout(Duration::from_secs(5));
/// assert_eq!(config.request_timeout(), Duration::from_secs(5));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    env: Environment,
    request_timeout: Duration,
}

impl Config {
    pub fn new(env: Environment) -> Self {
        Self {
            env,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn env(&self) -> Environment {
        self.env
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::new(Environment::Test)
    }
}

/// Tributary identity of the issuing taxpayer.
///
/// Built once by the caller (typically from the signing certificate and deployment
/// settings) and handed to whatever builds document headers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuerIdentity {
    pub ruc: String,
    pub legal_name: String,
    pub commercial_name: Option<String>,
    pub head_office_address: String,
    pub establishment: String,
    pub emission_point: String,
    pub accounting_obligation: Option<AccountingObligation>,
    pub special_taxpayer: Option<String>,
}

impl IssuerIdentity {
    /// Series used inside the access key (establishment followed by emission point).
    pub fn series(&self) -> String {
        format!("{}{}", self.establishment, self.emission_point)
    }

    /// Configuration problems that make issuing pointless; empty when usable.
    pub fn check(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if !is_digits_of_len(&self.ruc, 13) {
            problems.push("issuer RUC must have exactly 13 digits".to_string());
        }
        if self.legal_name.trim().is_empty() {
            problems.push("issuer legal name must not be empty".to_string());
        }
        if self.head_office_address.trim().is_empty() {
            problems.push("issuer head office address must not be empty".to_string());
        }
        if !is_digits_of_len(&self.establishment, 3) {
            problems.push("establishment must have exactly 3 digits".to_string());
        }
        if !is_digits_of_len(&self.emission_point, 3) {
            problems.push("emission point must have exactly 3 digits".to_string());
        }
        problems
    }
}

fn is_digits_of_len(value: &str, len: usize) -> bool {
    value.len() == len && value.bytes().all(|b| b.is_ascii_digit())
}

/// Private key container handed to the signer.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialBundle {
    key_store: PathBuf,
    password: String,
}

impl CredentialBundle {
    pub fn new(key_store: impl Into<PathBuf>, password: impl Into<String>) -> Self {
        Self {
            key_store: key_store.into(),
            password: password.into(),
        }
    }

    pub fn key_store(&self) -> &Path {
        &self.key_store
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialBundle")
            .field("key_store", &self.key_store)
            .field("password", &"<redacted>")
            .finish()
    }
}
