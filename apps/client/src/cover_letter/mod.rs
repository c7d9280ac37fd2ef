pub mod client;
pub mod models;
pub mod validation;

pub use client::CoverLetterClient;
pub use models::{CoverLetterRecord, CoverLetterRequest, SaveCoverLetterRequest};
pub use validation::validate_job_description_file;
