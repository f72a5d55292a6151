//! CLI command implementations

pub mod health;
pub mod history;
pub mod refresh;
pub mod status;
pub mod watch;

pub use health::health;
pub use history::history;
pub use refresh::refresh;
pub use status::status;
pub use watch::watch;
