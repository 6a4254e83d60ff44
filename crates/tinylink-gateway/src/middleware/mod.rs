mod session;
mod trusted;

pub use session::{session_cookie, session_middleware, session_token};
pub use trusted::trusted_subnet_guard;
