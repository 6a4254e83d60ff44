//! Anonymous session identity.
//!
//! A session token is the hex encoding of `nonce || AES-GCM(user id)` under a
//! key held only by the server. [`SessionResolver`] turns the token a client
//! presents into a [`UserId`][tinylink_core::UserId], minting a new identity
//! whenever the token is missing, undecodable or names an unknown user.

pub mod codec;
pub mod error;
pub mod resolver;

pub use codec::{SessionCodec, SessionKey};
pub use error::{CodecError, SessionError};
pub use resolver::{Session, SessionResolver};

/// Name of the cookie (and gRPC metadata key) carrying the session token.
pub const SESSION_COOKIE: &str = "session_token";
