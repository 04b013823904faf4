//! # Configuration store.
//!
//! - [`ConfigurationStore`] the live, ordered collection of records
//! - [`Comparator`], [`by_name`], [`by_custom_order`] ordering helpers
//! - [`StateStorage`], [`FileStorage`], [`PersistedState`] persistence
//!
//! The store publishes `RecordAdded`, `RecordChanged`, `RecordRemoved`,
//! `SelectionChanged`, `BeforeRunTasksChanged` and `StateLoaded` on its bus.

mod collection;
mod order;
mod storage;

pub use collection::{ConfigurationStore, FolderGroup, TypeGroup};
pub use order::{by_custom_order, by_name, Comparator};
pub use storage::{FileStorage, PersistedState, StateStorage};
