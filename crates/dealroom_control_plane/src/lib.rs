pub mod app;

pub use app::{build_router, spawn_session_reaper, AppState, Session};
