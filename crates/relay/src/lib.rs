//! Relay between the user-management front end and the remote directory:
//! injects the directory credential, normalizes directory errors into
//! `{ error: { status }, message }`, and proxies the rest of `/api`.

pub mod api;
pub mod app_state;
pub mod config;

pub use api::build_router;
pub use app_state::RelayState;
pub use config::{load_settings, RelayConfig, Settings};
