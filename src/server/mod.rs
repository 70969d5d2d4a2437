//! Wyoming TTS server: listening endpoints and per-client sessions.

mod info;
mod listener;
mod session;

pub use listener::{Server, ServerUri};
pub use session::{Session, SessionConfig};
