use thiserror::Error;

/// EIP-1193 code for "user rejected the request".
pub const USER_REJECTED_CODE: i64 = 4001;

/// JSON-RPC code for "method not found".
pub const METHOD_NOT_FOUND_CODE: i64 = -32601;

/// Application-wide error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No wallet provider: {0}")]
    NoProvider(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Wallet returned no accounts")]
    NoAccounts,

    #[error("Balance query failed: {0}")]
    BalanceQuery(String),

    #[error("Deployment failed: {0}")]
    Deployment(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("ABI error: {0}")]
    Abi(String),

    #[error("Artifact error: {0}")]
    Artifact(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
}

impl AppError {
    pub fn invalid_state<S: Into<String>>(msg: S) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn abi<S: Into<String>>(msg: S) -> Self {
        Self::Abi(msg.into())
    }

    /// True when the wallet reported that the human declined the prompt.
    pub fn is_user_rejection(&self) -> bool {
        matches!(self, Self::Rpc { code, .. } if *code == USER_REJECTED_CODE)
    }

    /// Short failure reason suitable for a `Failed { reason }` record.
    pub fn reason(&self) -> String {
        if self.is_user_rejection() {
            "user rejected".to_string()
        } else {
            match self {
                Self::Rpc { message, .. } => message.clone(),
                Self::Deployment(reason) => reason.clone(),
                other => other.to_string(),
            }
        }
    }

    /// Text shown to the end user. Raw diagnostics stay in the log.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NoProvider(_) => {
                "No wallet provider detected. Install a wallet extension and try again."
            }
            Self::Connection(_) => "Error connecting to the wallet. See console output for details.",
            Self::NoAccounts => "The wallet did not share any accounts.",
            Self::BalanceQuery(_) => "Error getting balance. See console output for details.",
            Self::Deployment(_) | Self::Abi(_) | Self::Artifact(_) => {
                "Error deploying contract. See console output for details."
            }
            Self::InvalidState(_) => "That action is not available right now.",
            Self::Http(_) | Self::Json(_) | Self::Rpc { .. } => {
                "Unexpected provider error. See console output for details."
            }
        }
    }

    /// Whether the application can keep running after this error.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::NoProvider(_))
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_rejection_is_detected_from_rpc_code() {
        let err = AppError::Rpc {
            code: USER_REJECTED_CODE,
            message: "User denied transaction signature".to_string(),
        };
        assert!(err.is_user_rejection());
        assert_eq!(err.reason(), "user rejected");

        let other = AppError::Rpc {
            code: -32000,
            message: "insufficient funds".to_string(),
        };
        assert!(!other.is_user_rejection());
        assert_eq!(other.reason(), "insufficient funds");
    }

    #[test]
    fn only_missing_provider_is_fatal() {
        assert!(!AppError::NoProvider("unset".into()).is_recoverable());
        assert!(AppError::NoAccounts.is_recoverable());
        assert!(AppError::BalanceQuery("timeout".into()).is_recoverable());
        assert!(AppError::Deployment("reverted".into()).is_recoverable());
    }
}
