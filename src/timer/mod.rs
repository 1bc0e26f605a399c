mod controller;
mod driver;
mod journal;
mod retry;
mod snapshot;
mod state;

pub use controller::TimerController;
pub use journal::CloseJournal;
pub use retry::PendingClose;
pub use snapshot::TimerSnapshot;
pub use state::{ActiveSession, Phase, TimerState};
