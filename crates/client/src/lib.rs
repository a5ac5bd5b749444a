//! Remote table store client.
//!
//! This crate is the single source of truth for the table wire contract:
//! load a document for a scope, upsert a full document, and the bearer
//! credentials both requests carry.
//!
//! No scheduling. No retries. Deciding when to save and what to do with a
//! failure belongs to the sync engine.

mod auth;
mod client;
mod error;
mod store;

pub use auth::{
    AuthCredentials, CredentialsError, auth_file_path, delete_auth, delete_auth_from, load_auth,
    load_auth_from, save_auth, save_auth_to,
};
pub use client::{HttpStore, LoadResponse, SaveRequest, SaveResponse};
pub use error::{ErrorKind, SyncError};
pub use store::{LoadOutcome, RemoteStore, SaveAck};
