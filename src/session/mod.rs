//! Session store: conversation state, phase machine, and per-session
//! locking (spec §3.3, §5).

pub mod store;
pub mod types;

pub use store::SessionStore;
pub use types::{ActiveSubgroup, ChatSession, Message, MessageRole, Phase};
