mod controller;
mod session;
mod shutdown;
mod state;

pub use controller::{Collaborators, SyncController, SyncError};
pub use shutdown::ShutdownGuard;
pub use state::SyncState;
