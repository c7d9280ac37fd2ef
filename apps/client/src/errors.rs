use thiserror::Error;

/// Client-level error type.
/// Every feature call returns `Result<T, ClientError>`; the message of each variant
/// is what the UI shows the user.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Malformed input caught before any network call.
    #[error("{0}")]
    Validation(String),

    /// A protected call was attempted with no usable token and the backend refused it.
    #[error("Authentication required")]
    AuthenticationRequired,

    /// The backend rejected the token attached to a protected call.
    #[error("Authentication expired. Please sign in again.")]
    AuthExpired,

    /// The backend rejected the credentials sent to a public endpoint.
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("{message}")]
    Backend { message: String, status: u16 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    /// A success response whose body did not have the expected shape.
    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("Session storage error: {0}")]
    Storage(String),

    #[error("Client configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// Errors after which the local session has already been cleared.
    pub fn is_session_breaking(&self) -> bool {
        matches!(
            self,
            ClientError::AuthExpired
                | ClientError::AuthenticationRequired
                | ClientError::RefreshFailed(_)
        )
    }

    /// Transport failures; the caller may try again unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Network(_))
    }

    /// HTTP status reported by the backend, if the error came from one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Backend { status, .. } => Some(*status),
            ClientError::AuthExpired
            | ClientError::AuthenticationRequired
            | ClientError::InvalidCredentials => Some(401),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Network("Request timed out. Please try again.".to_string())
        } else if err.is_decode() {
            ClientError::Decode(err.to_string())
        } else {
            ClientError::Network(format!("Unable to reach the server: {err}"))
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Decode(err.to_string())
    }
}
