pub mod client;
pub mod models;
pub mod reset;
pub mod validation;

pub use client::AuthClient;
pub use models::{LoginOutcome, ProfileUpdate, RegisterOutcome};
pub use reset::{PasswordResetFlow, ResetStep};
pub use validation::{password_strength, PasswordStrength};
