//! Client-side session handling: tokens, refresh, request mediation and
//! active-identity resolution.

pub mod endpoints;
pub mod identity;
pub mod manager;
pub mod response;
pub mod token;

pub use identity::{ActiveIdentity, AuthMethod, FederatedSession};
pub use manager::{RequestOptions, SessionManager, TokenPair};
pub use token::is_token_expired;
