//! Snippetbox domain models

pub mod snippet;
pub mod user;

// Re-export for convenience
pub use snippet::Snippet;
pub use user::User;
