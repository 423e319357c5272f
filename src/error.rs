//! Closed error taxonomy and classifier.
//!
//! Every failure the core produces or receives from an external
//! collaborator is promoted into a `BotError` before it crosses a
//! component boundary, so recovery decisions never branch on raw
//! strings past this module.

use std::fmt;

/// Severity band attached to a classified error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// What the caller should do in response to a classified error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStrategy {
    Retry,
    CircuitBreak,
    Shutdown,
    Skip,
}

/// The closed set of classified failure kinds (spec.md §4.1).
#[derive(Debug, Clone, thiserror::Error)]
pub enum BotError {
    #[error("network error [{code}]: {message}")]
    Network {
        code: String,
        is_retryable: bool,
        severity: Severity,
        message: String,
    },
    #[error("api error [{code}]: {message}")]
    Api {
        code: String,
        is_retryable: bool,
        severity: Severity,
        message: String,
    },
    #[error("validation error [{code}]: {message}")]
    Validation {
        code: String,
        is_retryable: bool,
        severity: Severity,
        message: String,
    },
    #[error("execution error [{code}]: {message}")]
    Execution {
        code: String,
        is_retryable: bool,
        severity: Severity,
        message: String,
    },
    #[error("database error [{code}]: {message}")]
    Database {
        code: String,
        is_retryable: bool,
        severity: Severity,
        message: String,
    },
    #[error("insufficient funds [{code}]: {message}")]
    InsufficientFunds {
        code: String,
        is_retryable: bool,
        severity: Severity,
        message: String,
    },
    #[error("circuit breaker [{code}]: {message}")]
    CircuitBreaker {
        code: String,
        is_retryable: bool,
        severity: Severity,
        message: String,
    },
    #[error("configuration error [{code}]: {message}")]
    Configuration {
        code: String,
        is_retryable: bool,
        severity: Severity,
        message: String,
    },
}

impl BotError {
    pub fn network(code: impl Into<String>, message: impl Into<String>) -> Self {
        BotError::Network {
            code: code.into(),
            is_retryable: true,
            severity: Severity::Medium,
            message: message.into(),
        }
    }

    pub fn api(code: impl Into<String>, message: impl Into<String>, is_retryable: bool) -> Self {
        BotError::Api {
            code: code.into(),
            is_retryable,
            severity: Severity::Medium,
            message: message.into(),
        }
    }

    pub fn validation(code: impl Into<String>, message: impl Into<String>) -> Self {
        BotError::Validation {
            code: code.into(),
            is_retryable: false,
            severity: Severity::High,
            message: message.into(),
        }
    }

    pub fn execution(code: impl Into<String>, message: impl Into<String>) -> Self {
        BotError::Execution {
            code: code.into(),
            is_retryable: false,
            severity: Severity::High,
            message: message.into(),
        }
    }

    pub fn database(code: impl Into<String>, message: impl Into<String>) -> Self {
        BotError::Database {
            code: code.into(),
            is_retryable: true,
            severity: Severity::High,
            message: message.into(),
        }
    }

    pub fn insufficient_funds(code: impl Into<String>, message: impl Into<String>) -> Self {
        BotError::InsufficientFunds {
            code: code.into(),
            is_retryable: false,
            severity: Severity::Critical,
            message: message.into(),
        }
    }

    pub fn circuit_breaker(code: impl Into<String>, message: impl Into<String>) -> Self {
        BotError::CircuitBreaker {
            code: code.into(),
            is_retryable: true,
            severity: Severity::High,
            message: message.into(),
        }
    }

    pub fn configuration(code: impl Into<String>, message: impl Into<String>) -> Self {
        BotError::Configuration {
            code: code.into(),
            is_retryable: false,
            severity: Severity::Critical,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            BotError::Network { is_retryable, .. }
            | BotError::Api { is_retryable, .. }
            | BotError::Validation { is_retryable, .. }
            | BotError::Execution { is_retryable, .. }
            | BotError::Database { is_retryable, .. }
            | BotError::InsufficientFunds { is_retryable, .. }
            | BotError::CircuitBreaker { is_retryable, .. }
            | BotError::Configuration { is_retryable, .. } => *is_retryable,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            BotError::Network { severity, .. }
            | BotError::Api { severity, .. }
            | BotError::Validation { severity, .. }
            | BotError::Execution { severity, .. }
            | BotError::Database { severity, .. }
            | BotError::InsufficientFunds { severity, .. }
            | BotError::CircuitBreaker { severity, .. }
            | BotError::Configuration { severity, .. } => *severity,
        }
    }

    pub fn code(&self) -> &str {
        match self {
            BotError::Network { code, .. }
            | BotError::Api { code, .. }
            | BotError::Validation { code, .. }
            | BotError::Execution { code, .. }
            | BotError::Database { code, .. }
            | BotError::InsufficientFunds { code, .. }
            | BotError::CircuitBreaker { code, .. }
            | BotError::Configuration { code, .. } => code,
        }
    }

    /// What a caller holding this error should do next (spec.md §4.1 / §7).
    pub fn recovery_strategy(&self) -> RecoveryStrategy {
        match self {
            BotError::Network { .. } | BotError::Api { .. } => RecoveryStrategy::Retry,
            BotError::Database { .. } => RecoveryStrategy::CircuitBreak,
            _ if !self.is_retryable() && self.severity() == Severity::Critical => {
                RecoveryStrategy::Shutdown
            }
            _ => RecoveryStrategy::Skip,
        }
    }

    /// Promote an opaque failure message into a typed error via the
    /// lowercased-substring heuristic (spec.md §4.1). Fragile by design —
    /// only meant for legacy/third-party failures that can't carry a kind.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();

        if lower.contains("timeout")
            || lower.contains("network")
            || lower.contains("connection")
            || lower.contains("enotfound")
            || lower.contains("econnrefused")
        {
            return BotError::network("NETWORK_CLASSIFIED", message);
        }
        if lower.contains("mongo")
            || lower.contains("database")
            || (lower.contains("connection") && lower.contains("failed"))
        {
            return BotError::database("DATABASE_CLASSIFIED", message);
        }
        if lower.contains("api")
            || lower.contains("http")
            || (lower.contains("request") && lower.contains("failed"))
        {
            return BotError::api("API_CLASSIFIED", message, true);
        }
        if lower.contains("insufficient") && lower.contains("balance") {
            return BotError::insufficient_funds("INSUFFICIENT_FUNDS_CLASSIFIED", message);
        }
        if lower.contains("validation") || lower.contains("invalid") {
            return BotError::validation("VALIDATION_CLASSIFIED", message);
        }
        BotError::execution("EXECUTION_CLASSIFIED", message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_taxonomy_table() {
        assert!(BotError::network("X", "m").is_retryable());
        assert_eq!(BotError::network("X", "m").severity(), Severity::Medium);
        assert!(!BotError::validation("X", "m").is_retryable());
        assert_eq!(BotError::validation("X", "m").severity(), Severity::High);
        assert!(!BotError::insufficient_funds("X", "m").is_retryable());
        assert_eq!(
            BotError::insufficient_funds("X", "m").severity(),
            Severity::Critical
        );
        assert!(!BotError::configuration("X", "m").is_retryable());
        assert_eq!(
            BotError::configuration("X", "m").severity(),
            Severity::Critical
        );
    }

    #[test]
    fn classify_timeout_is_network() {
        let e = BotError::classify("ETIMEDOUT while connecting");
        assert!(matches!(e, BotError::Network { .. }));
    }

    #[test]
    fn classify_mongo_is_database() {
        let e = BotError::classify("MongoServerError: topology was destroyed");
        assert!(matches!(e, BotError::Database { .. }));
    }

    #[test]
    fn classify_insufficient_balance() {
        let e = BotError::classify("insufficient balance to cover order");
        assert!(matches!(e, BotError::InsufficientFunds { .. }));
    }

    #[test]
    fn classify_falls_back_to_execution() {
        let e = BotError::classify("something unexpected happened");
        assert!(matches!(e, BotError::Execution { .. }));
        assert!(!e.is_retryable());
    }

    #[test]
    fn recovery_strategy_table() {
        assert_eq!(
            BotError::network("X", "m").recovery_strategy(),
            RecoveryStrategy::Retry
        );
        assert_eq!(
            BotError::database("X", "m").recovery_strategy(),
            RecoveryStrategy::CircuitBreak
        );
        assert_eq!(
            BotError::configuration("X", "m").recovery_strategy(),
            RecoveryStrategy::Shutdown
        );
        assert_eq!(
            BotError::execution("X", "m").recovery_strategy(),
            RecoveryStrategy::Skip
        );
    }
}
