pub mod auth;
pub mod config;
pub mod cover_letter;
pub mod errors;
pub mod models;
pub mod session;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_utils;
