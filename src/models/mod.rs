pub mod session;

pub use session::{SessionId, SessionKind, TimerSession};
