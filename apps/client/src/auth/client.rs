//! Auth feature calls: sign-in paths, logout, email check, profile and the
//! password-reset endpoints.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::auth::models::{
    ForgotPasswordRequest, GoogleSignInRequest, LoginOutcome, LoginRequest, ProfileUpdate,
    RegisterOutcome, RegisterRequest, ResetPasswordRequest, VerifyCodeRequest,
};
use crate::auth::validation::{
    require, validate_email, validate_new_password, validate_password, validate_reset_code,
};
use crate::errors::ClientError;
use crate::models::user::UserProfile;
use crate::session::{AuthMethod, RequestOptions, SessionManager, TokenPair};

#[derive(Clone)]
pub struct AuthClient {
    session: Arc<SessionManager>,
}

impl AuthClient {
    pub fn new(session: Arc<SessionManager>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<Value, ClientError> {
        let body = serde_json::to_value(body)?;
        self.session.request(path, RequestOptions::post(body)).await
    }

    /// Email/password sign-in. Inputs are checked locally first.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, ClientError> {
        validate_email(email)?;
        validate_password(password)?;

        let path = self.session.endpoints().login.clone();
        let body = self
            .post(
                &path,
                &LoginRequest {
                    email: email.trim(),
                    password,
                },
            )
            .await?;

        let tokens = TokenPair::from_body(&body).ok_or_else(|| {
            ClientError::Decode("login response has no access_token".to_string())
        })?;
        self.session.store_tokens(&tokens).await?;

        let profile = login_user(&body).and_then(UserProfile::from_backend);
        if let Some(profile) = &profile {
            self.session.cache_profile(profile).await?;
        }
        self.session.record_sign_in(AuthMethod::Local).await?;

        info!("Signed in with email and password");
        Ok(LoginOutcome { tokens, profile })
    }

    pub async fn register(
        &self,
        username: &str,
        full_name: &str,
        email: &str,
        password: &str,
    ) -> Result<RegisterOutcome, ClientError> {
        require("Username", username)?;
        require("Full name", full_name)?;
        validate_email(email)?;
        validate_new_password(password)?;

        let path = self.session.endpoints().register.clone();
        let body = self
            .post(
                &path,
                &RegisterRequest {
                    username: username.trim(),
                    full_name: full_name.trim(),
                    email: email.trim(),
                    password,
                },
            )
            .await?;

        let signed_in = match TokenPair::from_body(&body) {
            Some(tokens) => {
                self.session.store_tokens(&tokens).await?;
                self.session.record_sign_in(AuthMethod::Local).await?;
                true
            }
            None => false,
        };

        info!("Registered new account (signed in: {signed_in})");
        Ok(RegisterOutcome {
            signed_in,
            message: message_of(&body),
        })
    }

    /// Exchanges an identity-provider ID token for backend tokens.
    pub async fn google_sign_in(&self, id_token: &str) -> Result<TokenPair, ClientError> {
        require("ID token", id_token)?;

        let path = self.session.endpoints().google_sign_in.clone();
        let body = self.post(&path, &GoogleSignInRequest { id_token }).await?;

        let tokens = TokenPair::from_body(&body).ok_or_else(|| {
            ClientError::Decode("sign-in response has no access_token".to_string())
        })?;
        self.session.store_tokens(&tokens).await?;
        self.session.record_sign_in(AuthMethod::Federated).await?;

        info!("Signed in with identity provider");
        Ok(tokens)
    }

    /// Tells the backend (best-effort) and then always clears the local session.
    pub async fn logout(&self) -> Result<(), ClientError> {
        let path = self.session.endpoints().logout.clone();
        if let Err(e) = self
            .session
            .request(&path, RequestOptions::post_empty())
            .await
        {
            warn!("Backend logout failed, continuing with local cleanup: {e}");
        }

        self.session.end_session().await?;
        info!("Logged out");
        Ok(())
    }

    /// Whether an account exists for `email`.
    pub async fn check_email(&self, email: &str) -> Result<bool, ClientError> {
        validate_email(email)?;

        let path = self.session.endpoints().check_email.clone();
        let body = self
            .session
            .request(&path, RequestOptions::get().query("email", email.trim()))
            .await?;

        body.get("exists")
            .and_then(Value::as_bool)
            .or_else(|| body.get("available").and_then(Value::as_bool).map(|a| !a))
            .ok_or_else(|| ClientError::Decode("email check response has no 'exists'".into()))
    }

    /// Fetches the signed-in user's profile and refreshes the local cache.
    pub async fn current_user(&self) -> Result<UserProfile, ClientError> {
        let path = self.session.endpoints().profile.clone();
        let body = self.session.request(&path, RequestOptions::get()).await?;

        let profile = UserProfile::from_backend(&body)
            .ok_or_else(|| ClientError::Decode("profile response has no email".to_string()))?;
        self.session.cache_profile(&profile).await?;
        Ok(profile)
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<UserProfile, ClientError> {
        if update.is_empty() {
            return Err(ClientError::Validation("Nothing to update".to_string()));
        }
        if let Some(name) = &update.full_name {
            require("Full name", name)?;
        }
        if let Some(email) = &update.email {
            validate_email(email)?;
        }

        let path = self.session.endpoints().update_profile.clone();
        let body = self
            .session
            .request(&path, RequestOptions::put(serde_json::to_value(update)?))
            .await?;

        let profile = UserProfile::from_backend(&body).ok_or_else(|| {
            ClientError::Decode("profile update response has no email".to_string())
        })?;
        self.session.cache_profile(&profile).await?;
        Ok(profile)
    }

    /// Asks the backend to email a reset code.
    pub async fn forgot_password(&self, email: &str) -> Result<String, ClientError> {
        validate_email(email)?;

        let path = self.session.endpoints().forgot_password.clone();
        let body = self
            .post(&path, &ForgotPasswordRequest { email: email.trim() })
            .await?;
        Ok(message_of(&body).unwrap_or_else(|| "Reset code sent to your email".to_string()))
    }

    pub async fn verify_reset_code(&self, email: &str, code: &str) -> Result<String, ClientError> {
        validate_email(email)?;
        validate_reset_code(code)?;

        let path = self.session.endpoints().verify_reset_code.clone();
        let body = self
            .post(
                &path,
                &VerifyCodeRequest {
                    email: email.trim(),
                    code: code.trim(),
                },
            )
            .await?;
        Ok(message_of(&body).unwrap_or_else(|| "Code verified successfully".to_string()))
    }

    pub async fn reset_password(
        &self,
        email: &str,
        code: &str,
        new_password: &str,
    ) -> Result<String, ClientError> {
        validate_email(email)?;
        validate_reset_code(code)?;
        validate_new_password(new_password)?;

        let path = self.session.endpoints().reset_password.clone();
        let body = self
            .post(
                &path,
                &ResetPasswordRequest {
                    email: email.trim(),
                    code: code.trim(),
                    new_password,
                },
            )
            .await?;
        Ok(message_of(&body).unwrap_or_else(|| "Password updated successfully".to_string()))
    }
}

/// The `user` object of a login response, top-level or under `data`.
fn login_user(body: &Value) -> Option<&Value> {
    body.get("data")
        .and_then(|d| d.get("user"))
        .or_else(|| body.get("user"))
        .filter(|u| u.is_object())
}

fn message_of(body: &Value) -> Option<String> {
    body.get("message")
        .and_then(Value::as_str)
        .filter(|m| !m.trim().is_empty())
        .map(str::to_string)
}
