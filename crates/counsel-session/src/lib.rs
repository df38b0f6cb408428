//! Counsel Session State
//!
//! - A Session holds the signed-in identity plus its access and refresh tokens
//! - Exactly one Session exists per running client
//! - The TokenStore is the only writer of token fields
//! - Sessions persist across reloads; unreadable storage yields an empty Session

mod error;
mod session;
mod store;
mod token;
mod user;

pub use error::SessionError;
pub use session::Session;
pub use store::{SubscriptionId, TokenStore};
pub use token::Token;
pub use user::User;

pub type Result<T> = std::result::Result<T, SessionError>;
