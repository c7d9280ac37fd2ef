//! The three-step password reset: request a code, verify it, set a new password.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::auth::client::AuthClient;
use crate::auth::validation::{validate_confirmation, validate_new_password, validate_reset_code};
use crate::errors::ClientError;

/// How long an emailed code stays usable.
const DEFAULT_CODE_TTL: Duration = Duration::from_secs(20 * 60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetStep {
    EmailEntry,
    CodeSent {
        email: String,
        sent_at: DateTime<Utc>,
    },
    CodeVerified {
        email: String,
        code: String,
    },
    Completed,
}

pub struct PasswordResetFlow {
    client: AuthClient,
    step: ResetStep,
    code_ttl: Duration,
}

impl PasswordResetFlow {
    pub fn new(client: AuthClient) -> Self {
        Self {
            client,
            step: ResetStep::EmailEntry,
            code_ttl: DEFAULT_CODE_TTL,
        }
    }

    pub fn with_code_ttl(mut self, ttl: Duration) -> Self {
        self.code_ttl = ttl;
        self
    }

    pub fn step(&self) -> &ResetStep {
        &self.step
    }

    /// Sends the reset email. Allowed again from `CodeSent` to switch address.
    pub async fn request_code(&mut self, email: &str) -> Result<String, ClientError> {
        if !matches!(self.step, ResetStep::EmailEntry | ResetStep::CodeSent { .. }) {
            return Err(out_of_order("request a code"));
        }
        let message = self.client.forgot_password(email).await?;
        self.step = ResetStep::CodeSent {
            email: email.trim().to_string(),
            sent_at: Utc::now(),
        };
        Ok(message)
    }

    /// Sends a fresh code to the same address and restarts the countdown.
    pub async fn resend(&mut self) -> Result<String, ClientError> {
        let ResetStep::CodeSent { email, .. } = &self.step else {
            return Err(out_of_order("resend the code"));
        };
        let email = email.clone();
        let message = self.client.forgot_password(&email).await?;
        self.step = ResetStep::CodeSent {
            email,
            sent_at: Utc::now(),
        };
        info!("Reset code resent");
        Ok(message)
    }

    /// Seconds until the current code expires; zero outside `CodeSent`.
    pub fn seconds_remaining(&self) -> u64 {
        self.seconds_remaining_at(Utc::now())
    }

    fn seconds_remaining_at(&self, now: DateTime<Utc>) -> u64 {
        let ResetStep::CodeSent { sent_at, .. } = &self.step else {
            return 0;
        };
        let elapsed = now.signed_duration_since(*sent_at).num_seconds().max(0) as u64;
        self.code_ttl.as_secs().saturating_sub(elapsed)
    }

    pub async fn verify(&mut self, code: &str) -> Result<String, ClientError> {
        let ResetStep::CodeSent { email, .. } = &self.step else {
            return Err(out_of_order("verify a code"));
        };
        validate_reset_code(code)?;
        if self.seconds_remaining() == 0 {
            return Err(ClientError::Validation(
                "Code has expired. Please request a new code.".to_string(),
            ));
        }

        let email = email.clone();
        let message = self.client.verify_reset_code(&email, code).await?;
        self.step = ResetStep::CodeVerified {
            email,
            code: code.trim().to_string(),
        };
        Ok(message)
    }

    pub async fn complete(
        &mut self,
        new_password: &str,
        confirmation: &str,
    ) -> Result<String, ClientError> {
        let ResetStep::CodeVerified { email, code } = &self.step else {
            return Err(out_of_order("set a new password"));
        };
        validate_new_password(new_password)?;
        validate_confirmation(new_password, confirmation)?;

        let message = self
            .client
            .reset_password(email, code, new_password)
            .await?;
        self.step = ResetStep::Completed;
        info!("Password reset completed");
        Ok(message)
    }
}

fn out_of_order(action: &str) -> ClientError {
    ClientError::Validation(format!("Cannot {action} at this step"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{manager_for, MockBackend, MockResponse};
    use serde_json::json;
    use std::sync::Arc;

    fn flow_for(backend: &MockBackend) -> PasswordResetFlow {
        let (manager, _) = manager_for(backend);
        PasswordResetFlow::new(AuthClient::new(Arc::new(manager)))
    }

    fn happy_backend(backend: &MockBackend) {
        backend.on("POST", "/auth/forgot", MockResponse::json(200, json!({ "message": "sent" })));
        backend.on("POST", "/auth/verify-code", MockResponse::json(200, json!({})));
        backend.on("POST", "/auth/reset-password", MockResponse::json(200, json!({})));
    }

    #[tokio::test]
    async fn test_full_flow_walks_all_steps() {
        let backend = MockBackend::start().await;
        happy_backend(&backend);
        let mut flow = flow_for(&backend);

        assert_eq!(flow.request_code("a@b.com").await.unwrap(), "sent");
        assert!(flow.seconds_remaining() > 19 * 60);
        flow.verify("123456").await.unwrap();
        assert!(matches!(flow.step(), ResetStep::CodeVerified { .. }));
        assert_eq!(
            flow.complete("Abcdefg1", "Abcdefg1").await.unwrap(),
            "Password updated successfully"
        );
        assert_eq!(flow.step(), &ResetStep::Completed);

        let sent = &backend.requests_to("/auth/reset-password")[0];
        assert_eq!(sent.body["email"], "a@b.com");
        assert_eq!(sent.body["code"], "123456");
    }

    #[tokio::test]
    async fn test_steps_cannot_be_skipped() {
        let backend = MockBackend::start().await;
        let mut flow = flow_for(&backend);

        assert!(flow.verify("123456").await.is_err());
        assert!(flow.complete("Abcdefg1", "Abcdefg1").await.is_err());
        assert!(flow.resend().await.is_err());
        assert!(backend.requests().is_empty());
    }

    #[tokio::test]
    async fn test_expired_code_is_rejected_locally() {
        let backend = MockBackend::start().await;
        happy_backend(&backend);
        let mut flow = flow_for(&backend).with_code_ttl(Duration::ZERO);

        flow.request_code("a@b.com").await.unwrap();
        let err = flow.verify("123456").await.unwrap_err();

        assert_eq!(err.to_string(), "Code has expired. Please request a new code.");
        assert!(backend.requests_to("/auth/verify-code").is_empty());
    }

    #[tokio::test]
    async fn test_resend_restarts_countdown() {
        let backend = MockBackend::start().await;
        happy_backend(&backend);
        let mut flow = flow_for(&backend);

        flow.request_code("a@b.com").await.unwrap();
        let later = Utc::now() + chrono::Duration::minutes(15);
        assert!(flow.seconds_remaining_at(later) <= 5 * 60);

        flow.resend().await.unwrap();
        assert_eq!(backend.requests_to("/auth/forgot").len(), 2);
        assert!(flow.seconds_remaining() > 19 * 60);
    }

    #[tokio::test]
    async fn test_mismatched_confirmation_stays_verified() {
        let backend = MockBackend::start().await;
        happy_backend(&backend);
        let mut flow = flow_for(&backend);

        flow.request_code("a@b.com").await.unwrap();
        flow.verify("123456").await.unwrap();
        let err = flow.complete("Abcdefg1", "Abcdefg2").await.unwrap_err();

        assert_eq!(err.to_string(), "Passwords do not match");
        assert!(matches!(flow.step(), ResetStep::CodeVerified { .. }));
        assert!(backend.requests_to("/auth/reset-password").is_empty());
    }
}
