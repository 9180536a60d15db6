//! Foundation utilities shared by the scout crates: home-directory
//! resolution, the per-process session id, character-safe truncation,
//! and tracing initialization.

pub mod logging;
pub mod paths;
pub mod session;
pub mod text;

pub use paths::{audit_log_path, ensure_dir_all, raw_briefs_dir, scout_home};
pub use session::session_id;
pub use text::truncate_chars;
