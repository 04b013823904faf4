//! # Event subscribers.
//!
//! Subscribers receive the events published on the [`Bus`](crate::events::Bus)
//! asynchronously, each through its own bounded queue.
//!
//! ## Architecture
//! ```text
//! Store / Coordinator ── publish(Event) ──► Bus ──► subscriber listener
//!                                                         │
//!                                                  SubscriberSet::emit
//!                                            ┌────────────┼────────────┐
//!                                            ▼            ▼            ▼
//!                                        LogWriter      Metrics      Custom
//! ```
//!
//! Use a synchronous [`Listen`](crate::events::Listen)er instead when the
//! handler must run before `publish` returns (UI refresh, test assertions).
//!
//! ## Implementing custom subscribers
//! ```no_run
//! use launchvisor::subscribers::Subscribe;
//! use launchvisor::{Event, EventKind};
//! use async_trait::async_trait;
//!
//! struct Failures;
//!
//! #[async_trait]
//! impl Subscribe for Failures {
//!     async fn on_event(&self, event: &Event) {
//!         if event.kind == EventKind::LaunchNotStarted {
//!             // increment failure counter
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str {
//!         "failures"
//!     }
//! }
//! ```

#[cfg(feature = "logging")]
mod log;
mod set;
mod subscribe;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
