use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use crate::cover_letter::models::{CoverLetterRecord, CoverLetterRequest, SaveCoverLetterRequest};
use crate::cover_letter::validation::validate_request;
use crate::errors::ClientError;
use crate::session::{RequestOptions, SessionManager};

/// Generates, saves and lists cover letters through the session manager.
#[derive(Clone)]
pub struct CoverLetterClient {
    session: Arc<SessionManager>,
}

impl CoverLetterClient {
    pub fn new(session: Arc<SessionManager>) -> Self {
        Self { session }
    }

    /// Returns the generated letter text.
    pub async fn generate(&self, request: &CoverLetterRequest) -> Result<String, ClientError> {
        validate_request(request)?;

        let path = self.session.endpoints().cover_letter.clone();
        let body = self
            .session
            .request(&path, RequestOptions::post(serde_json::to_value(request)?))
            .await?;

        let letter = extract_letter(&body).ok_or_else(|| {
            ClientError::Decode("cover letter response has no letter text".to_string())
        })?;
        info!(
            "Generated cover letter for {} at {} ({} chars)",
            request.job_title,
            request.company_name,
            letter.len()
        );
        Ok(letter)
    }

    /// Stores a letter against the signed-in account. `letter` is the final
    /// text, including any edits made after generation. Returns the stored
    /// record when the backend echoes one.
    pub async fn save(
        &self,
        request: &CoverLetterRequest,
        letter: &str,
    ) -> Result<Option<CoverLetterRecord>, ClientError> {
        validate_request(request)?;
        if letter.trim().is_empty() {
            return Err(ClientError::Validation(
                "Generate a cover letter before saving".to_string(),
            ));
        }

        let path = self.session.endpoints().save_cover_letter.clone();
        let body = serde_json::to_value(SaveCoverLetterRequest {
            form: request,
            generated_letter: letter,
        })?;
        let reply = self
            .session
            .request(&path, RequestOptions::post(body))
            .await?;

        info!(
            "Saved cover letter for {} at {}",
            request.job_title, request.company_name
        );
        Ok(reply
            .get("data")
            .and_then(CoverLetterRecord::from_value)
            .or_else(|| CoverLetterRecord::from_value(&reply)))
    }

    pub async fn list(&self) -> Result<Vec<CoverLetterRecord>, ClientError> {
        let path = self.session.endpoints().cover_letter.clone();
        let body = self.session.request(&path, RequestOptions::get()).await?;

        let items = body
            .as_array()
            .or_else(|| body.get("data").and_then(Value::as_array))
            .or_else(|| body.get("items").and_then(Value::as_array))
            .or_else(|| {
                body.get("data")
                    .and_then(|d| d.get("items"))
                    .and_then(Value::as_array)
            })
            .ok_or_else(|| ClientError::Decode("cover letter list is not an array".to_string()))?;

        Ok(items.iter().filter_map(CoverLetterRecord::from_value).collect())
    }
}

fn extract_letter(body: &Value) -> Option<String> {
    let pick = |v: &Value| {
        ["generated_letter", "letter"]
            .iter()
            .filter_map(|key| v.get(*key).and_then(Value::as_str))
            .find(|s| !s.trim().is_empty())
            .map(str::to_string)
    };
    body.get("data").and_then(pick).or_else(|| pick(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::token::token_expiring_in;
    use crate::session::TokenPair;
    use crate::test_utils::{manager_for, MockBackend, MockResponse};
    use serde_json::json;

    async fn signed_in_client(backend: &MockBackend) -> CoverLetterClient {
        let (manager, _) = manager_for(backend);
        manager
            .store_tokens(&TokenPair {
                access_token: token_expiring_in(600),
                refresh_token: None,
            })
            .await
            .unwrap();
        CoverLetterClient::new(Arc::new(manager))
    }

    fn request() -> CoverLetterRequest {
        CoverLetterRequest {
            full_name: "Ada Lovelace".into(),
            job_title: "Engineer".into(),
            company_name: "Acme".into(),
            key_qualifications: "Rust".into(),
            job_description_url: None,
        }
    }

    #[tokio::test]
    async fn test_generate_reads_nested_letter_with_bearer() {
        let backend = MockBackend::start().await;
        backend.on(
            "POST",
            "/cover/cover-letter",
            MockResponse::json(200, json!({ "data": { "generated_letter": "Dear Acme" } })),
        );
        let client = signed_in_client(&backend).await;

        assert_eq!(client.generate(&request()).await.unwrap(), "Dear Acme");

        let sent = &backend.requests_to("/cover/cover-letter")[0];
        assert!(sent.authorization.as_deref().unwrap().starts_with("Bearer "));
        assert_eq!(sent.body["company_name"], "Acme");
    }

    #[tokio::test]
    async fn test_generate_empty_letter_is_decode_error() {
        let backend = MockBackend::start().await;
        backend.on(
            "POST",
            "/cover/cover-letter",
            MockResponse::json(200, json!({ "letter": "" })),
        );
        let client = signed_in_client(&backend).await;

        let err = client.generate(&request()).await.unwrap_err();
        assert!(matches!(err, ClientError::Decode(_)));
    }

    #[tokio::test]
    async fn test_generate_validates_before_sending() {
        let backend = MockBackend::start().await;
        let client = signed_in_client(&backend).await;

        let mut bad = request();
        bad.full_name.clear();
        assert_eq!(
            client.generate(&bad).await.unwrap_err().to_string(),
            "Full name is required"
        );
        assert!(backend.requests().is_empty());
    }

    #[tokio::test]
    async fn test_save_sends_edited_letter_text() {
        let backend = MockBackend::start().await;
        backend.on(
            "POST",
            "/cover/save-cover-letter",
            MockResponse::json(
                201,
                json!({ "data": { "id": 7, "generated_letter": "Dear Acme, edited" } }),
            ),
        );
        let client = signed_in_client(&backend).await;

        let saved = client
            .save(&request(), "Dear Acme, edited")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(saved.id.as_deref(), Some("7"));
        let sent = &backend.requests_to("/cover/save-cover-letter")[0];
        assert_eq!(sent.body["generated_letter"], "Dear Acme, edited");
        assert_eq!(sent.body["full_name"], "Ada Lovelace");
        assert!(sent.authorization.is_some());
    }

    #[tokio::test]
    async fn test_save_rejects_empty_letter_without_network() {
        let backend = MockBackend::start().await;
        let client = signed_in_client(&backend).await;

        assert!(client.save(&request(), "   ").await.is_err());
        assert!(backend.requests().is_empty());
    }

    #[tokio::test]
    async fn test_save_without_echo_returns_none() {
        let backend = MockBackend::start().await;
        backend.on(
            "POST",
            "/cover/save-cover-letter",
            MockResponse::json(200, json!({ "message": "Saved" })),
        );
        let client = signed_in_client(&backend).await;

        assert_eq!(client.save(&request(), "Dear Acme").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_list_accepts_array_shapes() {
        let backend = MockBackend::start().await;
        backend.on(
            "GET",
            "/cover/cover-letter",
            MockResponse::json(200, json!([{ "id": 1, "letter": "A" }, { "id": 2 }])),
        );
        backend.on(
            "GET",
            "/cover/cover-letter",
            MockResponse::json(200, json!({ "data": { "items": [{ "id": "x", "generated_letter": "B" }] } })),
        );
        let client = signed_in_client(&backend).await;

        let first = client.list().await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].letter, "A");

        let second = client.list().await.unwrap();
        assert_eq!(second[0].id.as_deref(), Some("x"));
    }

    #[tokio::test]
    async fn test_list_with_expired_session_is_auth_expired() {
        let backend = MockBackend::start().await;
        backend.on(
            "GET",
            "/cover/cover-letter",
            MockResponse::json(401, json!({ "detail": "Token expired" })),
        );
        let client = signed_in_client(&backend).await;

        let err = client.list().await.unwrap_err();
        assert!(matches!(err, ClientError::AuthExpired));
        assert!(err.is_session_breaking());
    }
}
