//! Client-side coordination for consumers of the push channel.
//!
//! - [`Backoff`]: bounded exponential reconnect schedule
//! - [`RenderGuard`] / [`ViewWorker`]: one render at a time per view, latest
//!   pending snapshot wins

pub mod backoff;
pub mod render_guard;

pub use backoff::{Backoff, ReconnectPolicy};
pub use render_guard::{Render, RenderGuard, ViewWorker};
