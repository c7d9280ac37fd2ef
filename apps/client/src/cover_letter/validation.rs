use crate::auth::validation::require;
use crate::cover_letter::models::CoverLetterRequest;
use crate::errors::ClientError;

pub const MAX_JOB_DESCRIPTION_BYTES: u64 = 2 * 1024 * 1024;

const ALLOWED_CONTENT_TYPES: [&str; 4] = [
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "text/plain",
];

const ALLOWED_EXTENSIONS: [&str; 4] = [".pdf", ".doc", ".docx", ".txt"];

pub fn validate_request(request: &CoverLetterRequest) -> Result<(), ClientError> {
    require("Full name", &request.full_name)?;
    require("Job title", &request.job_title)?;
    require("Company name", &request.company_name)?;

    if let Some(url) = &request.job_description_url {
        let url = url.trim();
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(ClientError::Validation(
                "Job description link must be an http(s) URL".to_string(),
            ));
        }
    }
    Ok(())
}

/// Checks an upload before it is sent anywhere. A file passes on either its
/// MIME type or its extension.
pub fn validate_job_description_file(
    name: &str,
    content_type: Option<&str>,
    size: u64,
) -> Result<(), ClientError> {
    let type_ok = content_type.is_some_and(|ct| {
        let essence = ct.split(';').next().unwrap_or_default().trim();
        ALLOWED_CONTENT_TYPES
            .iter()
            .any(|allowed| essence.eq_ignore_ascii_case(allowed))
    });
    let name = name.to_ascii_lowercase();
    let extension_ok = ALLOWED_EXTENSIONS.iter().any(|ext| name.ends_with(ext));

    if !type_ok && !extension_ok {
        return Err(ClientError::Validation(
            "Please upload only PDF, DOC, DOCX, or TXT files.".to_string(),
        ));
    }
    if size > MAX_JOB_DESCRIPTION_BYTES {
        return Err(ClientError::Validation(
            "File size must be less than 2MB.".to_string(),
        ));
    }
    Ok(())
}
