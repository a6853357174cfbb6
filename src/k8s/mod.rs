pub mod auth;
pub mod patch;
pub mod pod;

pub use auth::{Bootstrap, TokenStore};
pub use patch::PatchOutcome;
