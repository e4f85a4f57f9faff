//! # CTN ASR Core
//!
//! Core business logic for the CTN association-registry backend.
//!
//! This crate contains the domain types shared across the system together
//! with the two resilience components every request path is built on: the
//! circuit breaker that guards calls to external registries (KvK, GLEIF,
//! Peppol) and the middleware pipeline that threads authentication,
//! authorization, audit logging, and request-ID propagation through every
//! HTTP handler.
//!
//! ## Architecture
//!
//! The core follows clean architecture principles:
//! - Business logic depends only on trait abstractions
//! - Infrastructure implementations are injected at runtime
//! - All external dependencies are abstracted behind traits
//!
//! ## Usage
//!
//! ```rust
//! use ctn_asr_core::{KvkNumber, RequestId};
//!
//! let request_id = RequestId::new();
//! let kvk = KvkNumber::new("68750110").unwrap();
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

// Re-export commonly used types
pub use ulid::Ulid;
pub use uuid::Uuid;

/// Standard result type for ASR operations
pub type AsrResult<T> = Result<T, AsrError>;

// ============================================================================
// Domain Identifier Types
// ============================================================================

/// Unique identifier for a single inbound request
///
/// Generated at pipeline entry and attached to every response as the
/// `x-request-id` header so that client-reported failures can be correlated
/// with server-side logs and audit records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generate a new unique request ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get string representation of the request ID
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RequestId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = s.parse::<Uuid>().map_err(|_| ParseError::InvalidFormat {
            expected: "UUID format".to_string(),
            actual: s.to_string(),
        })?;
        Ok(Self(uuid))
    }
}

/// Unique identifier for a registered legal entity (association member)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberId(Uuid);

impl MemberId {
    /// Generate a new unique member ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get string representation of the member ID
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for MemberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MemberId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = s.parse::<Uuid>().map_err(|_| ParseError::InvalidFormat {
            expected: "UUID format".to_string(),
            actual: s.to_string(),
        })?;
        Ok(Self(uuid))
    }
}

/// Dutch Chamber of Commerce (KvK) registration number
///
/// KvK numbers are exactly eight ASCII digits. Leading zeros are
/// significant and preserved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KvkNumber(String);

impl KvkNumber {
    /// Create new KvK number with validation
    ///
    /// # Validation Rules
    /// - Must be exactly 8 characters
    /// - Must contain only ASCII digits
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();

        if value.is_empty() {
            return Err(ValidationError::Required {
                field: "kvk_number".to_string(),
            });
        }

        if value.len() != 8 {
            return Err(ValidationError::InvalidFormat {
                field: "kvk_number".to_string(),
                message: format!("expected 8 digits, got {} characters", value.len()),
            });
        }

        if !value.chars().all(|c| c.is_ascii_digit()) {
            return Err(ValidationError::InvalidCharacters {
                field: "kvk_number".to_string(),
                invalid_chars: "non-digit characters".to_string(),
            });
        }

        Ok(Self(value))
    }

    /// Get string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KvkNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for KvkNumber {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// ISO 17442 Legal Entity Identifier
///
/// A LEI is 20 characters: 18 upper-case alphanumerics followed by two
/// check digits, verified with the ISO 7064 MOD 97-10 scheme (the same
/// checksum IBAN uses).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Lei(String);

impl Lei {
    /// Create new LEI with validation
    ///
    /// # Validation Rules
    /// - Must be exactly 20 characters
    /// - Upper-case alphanumeric, with numeric check digits at positions 19-20
    /// - MOD 97-10 checksum over the full identifier must equal 1
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();

        if value.is_empty() {
            return Err(ValidationError::Required {
                field: "lei".to_string(),
            });
        }

        if value.len() != 20 {
            return Err(ValidationError::InvalidFormat {
                field: "lei".to_string(),
                message: format!("expected 20 characters, got {}", value.len()),
            });
        }

        if !value
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
        {
            return Err(ValidationError::InvalidCharacters {
                field: "lei".to_string(),
                invalid_chars: "characters outside [0-9A-Z]".to_string(),
            });
        }

        if !value.chars().rev().take(2).all(|c| c.is_ascii_digit()) {
            return Err(ValidationError::InvalidFormat {
                field: "lei".to_string(),
                message: "check digits (positions 19-20) must be numeric".to_string(),
            });
        }

        if Self::mod_97(&value) != 1 {
            return Err(ValidationError::InvalidFormat {
                field: "lei".to_string(),
                message: "MOD 97-10 checksum failed".to_string(),
            });
        }

        Ok(Self(value))
    }

    /// Get string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// ISO 7064 MOD 97-10 over the expanded identifier
    ///
    /// Letters expand to their base-36 value (A=10 .. Z=35) while the
    /// running remainder is taken, so the full number never materializes.
    fn mod_97(value: &str) -> u32 {
        let mut remainder: u32 = 0;
        for c in value.chars() {
            let v = c.to_digit(36).unwrap_or(0);
            if v < 10 {
                remainder = (remainder * 10 + v) % 97;
            } else {
                remainder = (remainder * 100 + v) % 97;
            }
        }
        remainder
    }
}

impl fmt::Display for Lei {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Lei {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Peppol participant identifier
///
/// Format: `{scheme}:{value}` where the scheme is a four-digit ICD code
/// (e.g. `0106` for Dutch KvK numbers) and the value is the
/// scheme-specific identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeppolParticipantId(String);

impl PeppolParticipantId {
    /// Create new participant ID with validation
    ///
    /// # Validation Rules
    /// - Must contain a colon separating scheme and value
    /// - Scheme must be exactly 4 ASCII digits
    /// - Value must be 1-50 printable, non-whitespace ASCII characters
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();

        if value.is_empty() {
            return Err(ValidationError::Required {
                field: "peppol_participant_id".to_string(),
            });
        }

        let Some((scheme, identifier)) = value.split_once(':') else {
            return Err(ValidationError::InvalidFormat {
                field: "peppol_participant_id".to_string(),
                message: "expected '{scheme}:{value}' format".to_string(),
            });
        };

        if scheme.len() != 4 || !scheme.chars().all(|c| c.is_ascii_digit()) {
            return Err(ValidationError::InvalidFormat {
                field: "peppol_participant_id".to_string(),
                message: "scheme must be a 4-digit ICD code".to_string(),
            });
        }

        if identifier.is_empty() {
            return Err(ValidationError::Required {
                field: "peppol_participant_id".to_string(),
            });
        }

        if identifier.len() > 50 {
            return Err(ValidationError::TooLong {
                field: "peppol_participant_id".to_string(),
                max_length: 50,
            });
        }

        if !identifier.chars().all(|c| c.is_ascii_graphic()) {
            return Err(ValidationError::InvalidCharacters {
                field: "peppol_participant_id".to_string(),
                invalid_chars: "non-printable or whitespace characters".to_string(),
            });
        }

        Ok(Self(value))
    }

    /// Get string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Extract the four-digit ICD scheme code
    pub fn scheme(&self) -> &str {
        self.0.split_once(':').map(|(s, _)| s).unwrap_or("")
    }
}

impl fmt::Display for PeppolParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PeppolParticipantId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

// ============================================================================
// Time Types
// ============================================================================

/// UTC timestamp with microsecond precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create timestamp for current moment
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Parse timestamp from RFC3339 string
    pub fn from_rfc3339(s: &str) -> Result<Self, ParseError> {
        let dt = DateTime::parse_from_rfc3339(s)
            .map_err(|_| ParseError::InvalidFormat {
                expected: "RFC3339 datetime".to_string(),
                actual: s.to_string(),
            })?
            .with_timezone(&Utc);
        Ok(Self(dt))
    }

    /// Convert to RFC3339 string
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339()
    }

    /// Get underlying DateTime
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Add milliseconds to timestamp
    pub fn add_millis(&self, millis: u64) -> Self {
        let duration = chrono::Duration::milliseconds(millis as i64);
        Self(self.0 + duration)
    }

    /// Subtract duration from timestamp
    pub fn subtract_duration(&self, duration: Duration) -> Self {
        let chrono_duration = chrono::Duration::from_std(duration).unwrap_or_default();
        Self(self.0 - chrono_duration)
    }

    /// Get duration since another timestamp (zero if `other` is later)
    pub fn duration_since(&self, other: Self) -> Duration {
        let chrono_duration = self.0.signed_duration_since(other.0);
        chrono_duration.to_std().unwrap_or_default()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// High-level error categorization for retry and alerting decisions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Temporary failures that should be retried
    Transient,
    /// Permanent failures that won't succeed on retry
    Permanent,
    /// Security-related failures requiring immediate attention
    Security,
    /// Configuration errors preventing startup
    Configuration,
}

/// Error type for input validation failures
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
pub enum ValidationError {
    #[error("Field '{field}' is required")]
    Required { field: String },

    #[error("Field '{field}' has invalid format: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Field '{field}' exceeds maximum length of {max_length}")]
    TooLong { field: String, max_length: usize },

    #[error("Field '{field}' contains invalid characters: {invalid_chars}")]
    InvalidCharacters {
        field: String,
        invalid_chars: String,
    },
}

/// Error type for string parsing failures
#[derive(Debug, Clone, thiserror::Error)]
pub enum ParseError {
    #[error("Invalid format: expected {expected}, got '{actual}'")]
    InvalidFormat { expected: String, actual: String },
}

/// Top-level error type for ASR operations
#[derive(Debug, thiserror::Error)]
pub enum AsrError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("External service error: {service} - {message}")]
    ExternalService { service: String, message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AsrError {
    /// Check if error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ExternalService { .. } => true,
            Self::Internal { .. } => true,
            Self::Validation(_) => false,
            Self::Parse(_) => false,
            Self::Configuration { .. } => false,
        }
    }

    /// Get error category for monitoring and alerting
    pub fn error_category(&self) -> ErrorCategory {
        match self {
            Self::Validation(_) => ErrorCategory::Permanent,
            Self::Parse(_) => ErrorCategory::Permanent,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::ExternalService { .. } => ErrorCategory::Transient,
            Self::Internal { .. } => ErrorCategory::Transient,
        }
    }
}

// ============================================================================
// Module declarations
// ============================================================================

/// Circuit breaker guarding calls to external registries
pub mod circuit_breaker;

/// Middleware pipeline composing per-route request handling
pub mod middleware;

/// Audit trail events and sinks
pub mod audit;

/// Registry verification against KvK, GLEIF, and Peppol
pub mod verification;

// Re-export key types for convenience
pub use audit::{AuditActor, AuditEvent, AuditEventId, AuditOutcome, AuditSink, TracingAuditSink};
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerRegistry,
    CircuitState, CircuitStats, WindowedCircuitBreaker,
};
pub use middleware::{
    ApiRequest, ApiResponse, AuthenticatedRequest, Handler, Middleware, Next, Pipeline,
    RequestContext, StageError,
};
pub use verification::{
    GuardedRegistryClient, LookupError, RegistryClient, VerificationOutcome, VerificationService,
};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
