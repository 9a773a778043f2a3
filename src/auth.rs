//! Credential models, the client-credentials source, and the single-flight token cache.

pub mod cache;
pub mod credential;
pub mod secret;
pub mod source;

pub use cache::*;
pub use credential::*;
pub use secret::*;
pub use source::*;
