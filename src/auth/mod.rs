// Authentication module
// Credential storage, token inspection, and refresh coordination

mod inspect;
mod refresh;
mod store;
mod types;

pub use inspect::{decode, is_expired, is_expired_at};
pub use refresh::RefreshCoordinator;
pub use store::CredentialStore;
pub use types::{Claims, CredentialPair, LoginRequest, TokenResponse};
