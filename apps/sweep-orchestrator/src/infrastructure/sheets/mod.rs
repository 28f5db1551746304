//! Remote sheet adapter.

mod auth;
mod client;

pub use auth::{
    CredentialError, DEFAULT_TOKEN_URI, SHEETS_SCOPE, ServiceAccountKey, SheetsCredential,
    TokenSource,
};
pub use client::{DEFAULT_SHEETS_BASE_URL, SheetsClient, SheetsConfig};
