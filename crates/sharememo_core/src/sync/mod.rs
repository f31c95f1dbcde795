//! Live document synchronization.

pub mod live_session;

pub use live_session::{LiveSyncEngine, MemoSession, RemoteContentCallback, SessionState};
