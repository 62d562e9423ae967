use std::error::Error;
use std::fmt;

use thiserror::Error as ThisError;

/// Unified application error for the binary.
///
/// Settlement failures are carried inside `Settlement`; everything else
/// (bad flags, missing env) fails early as `Config`.
#[derive(Debug)]
pub enum AppError {
    Config(String),
    Settlement(SettlementError),
    Output(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(msg) => write!(f, "Config error: {}", msg),
            AppError::Settlement(err) => write!(f, "Settlement error: {}", err),
            AppError::Output(msg) => write!(f, "Output error: {}", msg),
        }
    }
}

impl Error for AppError {}

impl From<SettlementError> for AppError {
    fn from(err: SettlementError) -> Self {
        AppError::Settlement(err)
    }
}

/// Why a provider refused to serve a consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    NotInAllowList,
    InDenyList,
}

impl DenialReason {
    /// Provider error code carried in the error message.
    pub fn code(&self) -> &'static str {
        match self {
            DenialReason::NotInAllowList => "ConsumableCodes.CREDENTIAL_NOT_IN_ALLOW_LIST",
            DenialReason::InDenyList => "ConsumableCodes.CREDENTIAL_IN_DENY_LIST",
        }
    }

    /// Recognise a denial code inside a provider error message.
    pub fn from_message(message: &str) -> Option<Self> {
        [DenialReason::NotInAllowList, DenialReason::InDenyList]
            .into_iter()
            .find(|reason| message.contains(reason.code()))
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenialReason::NotInAllowList => write!(f, "consumer not in allow list"),
            DenialReason::InDenyList => write!(f, "consumer in deny list"),
        }
    }
}

/// Tagged error of the settlement flow.
///
/// Every step returns `SettlementResult`; callers match on the variant
/// instead of checking for a missing transaction hash.
#[derive(ThisError, Debug)]
pub enum SettlementError {
    #[error("Access denied ({reason}): {message}")]
    PolicyDenied { reason: DenialReason, message: String },

    #[error("Provider error: {message}")]
    Provider { message: String },

    #[error("SSI verification failed: {message}")]
    Ssi { message: String },

    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Parse error: {message}")]
    Parse { message: String },

    #[error("Not found: {what}")]
    NotFound { what: String },

    #[error("Chain call {method} failed: {reason}")]
    Chain {
        method: String,
        reason: String,
        code: Option<String>,
        tx: Option<String>,
    },

    #[error("Allowance still {observed} after {attempts} reads, need {required}")]
    AllowanceTimeout {
        attempts: u32,
        observed: u128,
        required: u128,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Pricing type not supported: {message}")]
    NotSupported { message: String },

    #[error("Invalid amount: {message}")]
    InvalidAmount { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl SettlementError {
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider { message: message.into() }
    }

    pub fn ssi(message: impl Into<String>) -> Self {
        Self::Ssi { message: message.into() }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network { message: message.into() }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse { message: message.into() }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn chain(method: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Chain {
            method: method.into(),
            reason: reason.into(),
            code: None,
            tx: None,
        }
    }

    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::NotSupported { message: message.into() }
    }

    pub fn invalid_amount(message: impl Into<String>) -> Self {
        Self::InvalidAmount { message: message.into() }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    /// Classify a provider error message, promoting known denial codes.
    pub fn from_provider_message(message: impl Into<String>) -> Self {
        let message = message.into();
        match DenialReason::from_message(&message) {
            Some(reason) => Self::PolicyDenied { reason, message },
            None => Self::Provider { message },
        }
    }

    /// `true` for failures caused by provider access policy rather than faults.
    pub fn is_policy_denial(&self) -> bool {
        matches!(self, Self::PolicyDenied { .. })
    }

    /// Log the error with its contextual fields.
    pub fn log(&self, context: &str) {
        match self {
            Self::Chain { method, reason, code, tx } => tracing::error!(
                method = %method,
                reason = %reason,
                code = code.as_deref().unwrap_or("-"),
                tx = tx.as_deref().unwrap_or("-"),
                "{}: chain call failed",
                context
            ),
            other => tracing::error!("{}: {}", context, other),
        }
    }
}

/// Result type for settlement operations
pub type SettlementResult<T> = Result<T, SettlementError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deny_list_code_is_recognised() {
        let err = SettlementError::from_provider_message(
            "Error: ConsumableCodes.CREDENTIAL_IN_DENY_LIST for 0xabc",
        );
        assert!(matches!(
            err,
            SettlementError::PolicyDenied { reason: DenialReason::InDenyList, .. }
        ));
    }

    #[test]
    fn allow_list_code_is_recognised() {
        let err = SettlementError::from_provider_message(
            "ConsumableCodes.CREDENTIAL_NOT_IN_ALLOW_LIST",
        );
        assert!(err.is_policy_denial());
        assert!(matches!(
            err,
            SettlementError::PolicyDenied { reason: DenialReason::NotInAllowList, .. }
        ));
    }

    #[test]
    fn other_messages_stay_provider_errors() {
        let err = SettlementError::from_provider_message("Provider timed out");
        assert!(matches!(err, SettlementError::Provider { .. }));
        assert!(!err.is_policy_denial());
    }

    #[test]
    fn chain_error_display_names_method() {
        let err = SettlementError::chain("approve", "execution reverted");
        assert_eq!(err.to_string(), "Chain call approve failed: execution reverted");
    }
}
