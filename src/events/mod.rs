//! Events: types and the bus.
//!
//! This module groups the event **data model** and the **bus** used to publish
//! store and launch events.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] ordered synchronous listeners plus a `tokio::sync::broadcast` tail
//! - [`Listen`] synchronous listener trait
//!
//! ## Quick reference
//! - **Publishers**: `ConfigurationStore`, `ExecutionCoordinator`, the process
//!   lifecycle relay.
//! - **Consumers**: synchronous [`Listen`]ers, and the coordinator's
//!   subscriber listener (fans out to `SubscriberSet`).

mod bus;
mod event;

pub use bus::{Bus, Listen};
pub use event::{Event, EventKind};
