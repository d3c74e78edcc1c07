mod auth;
mod client;
mod games;
mod users;

pub use auth::{FileCredentialStore, StaticCredentials, StoredCredentials};
pub use client::{ApiClient, LOGIN_PATH, UNAUTHORIZED_PATH};
