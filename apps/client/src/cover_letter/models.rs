use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Form input for one generated letter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoverLetterRequest {
    pub full_name: String,
    pub job_title: String,
    pub company_name: String,
    #[serde(default)]
    pub key_qualifications: String,
    /// Where an uploaded job description was stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_description_url: Option<String>,
}

/// The form plus the final letter text, which may have been edited after generation.
#[derive(Debug, Serialize)]
pub struct SaveCoverLetterRequest<'a> {
    #[serde(flatten)]
    pub form: &'a CoverLetterRequest,
    pub generated_letter: &'a str,
}

/// A previously generated letter as returned by the list endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoverLetterRecord {
    pub id: Option<String>,
    pub job_title: Option<String>,
    pub company_name: Option<String>,
    pub letter: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl CoverLetterRecord {
    /// Reads one list entry. Ids may be numeric or strings; entries without
    /// letter text are skipped.
    pub fn from_value(value: &Value) -> Option<Self> {
        let text = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let letter = text("generated_letter").or_else(|| text("letter"))?;
        let id = match value.get("id") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        let created_at = text("created_at")
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Some(Self {
            id,
            job_title: text("job_title"),
            company_name: text("company_name"),
            letter,
            created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_accepts_numeric_id_and_either_letter_key() {
        let record = CoverLetterRecord::from_value(&json!({
            "id": 42,
            "job_title": "Engineer",
            "letter": "Dear team",
            "created_at": "2024-05-01T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(record.id.as_deref(), Some("42"));
        assert_eq!(record.letter, "Dear team");
        assert_eq!(record.created_at.unwrap().timestamp(), 1_714_557_600);

        let record =
            CoverLetterRecord::from_value(&json!({ "id": "abc", "generated_letter": "Hi" })).unwrap();
        assert_eq!(record.id.as_deref(), Some("abc"));
        assert_eq!(record.company_name, None);
    }

    #[test]
    fn test_record_without_letter_is_skipped() {
        assert!(CoverLetterRecord::from_value(&json!({ "id": 1, "letter": "  " })).is_none());
    }

    #[test]
    fn test_save_request_flattens_form() {
        let form = CoverLetterRequest {
            full_name: "Ada".into(),
            job_title: "Engineer".into(),
            company_name: "Acme".into(),
            ..CoverLetterRequest::default()
        };
        let body = serde_json::to_value(SaveCoverLetterRequest {
            form: &form,
            generated_letter: "Dear Acme",
        })
        .unwrap();
        assert_eq!(body["company_name"], "Acme");
        assert_eq!(body["generated_letter"], "Dear Acme");
    }

    #[test]
    fn test_request_omits_missing_url() {
        let request = CoverLetterRequest {
            full_name: "Ada".into(),
            job_title: "Engineer".into(),
            company_name: "Acme".into(),
            ..CoverLetterRequest::default()
        };
        let body = serde_json::to_value(&request).unwrap();
        assert!(body.get("job_description_url").is_none());
        assert_eq!(body["key_qualifications"], "");
    }
}
