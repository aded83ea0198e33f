mod engine;
mod sessions;

pub use engine::RelayEngine;
pub use sessions::SessionManager;
