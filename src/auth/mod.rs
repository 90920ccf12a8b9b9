//! Session ownership: token access, the in-memory user and session lifecycle events

pub mod events;
pub mod session;
pub mod state;

pub use events::{EventBus, SessionEvent};
pub use session::SessionProvider;
pub use state::AuthState;
