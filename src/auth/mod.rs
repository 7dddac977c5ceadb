// Authentication module
// Manages the Smartflo bearer token lifecycle

mod coordinator;
mod credential;
mod login;

pub use coordinator::{RefreshCoordinator, RefreshState};
pub use credential::{Credential, CredentialStore};
pub use login::{LoginError, LoginExchange, LoginGrant, ServiceIdentity, SmartfloLogin};

pub(crate) use login::error_kind;

#[cfg(test)]
pub(crate) use coordinator::testing;
