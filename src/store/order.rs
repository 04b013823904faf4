//! # Record ordering.
//!
//! With grouping enabled, records sort by
//!
//! ```text
//! 1. type rank        registration order, unknown types last
//! 2. folder rank      first-seen order of folder names, un-foldered last
//! 3. temporary flag   stable records first
//! 4. comparator       caller supplied (absent = keep current order)
//! ```
//!
//! The sort is stable, so sorting an already sorted list with the same
//! comparator leaves it unchanged.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use crate::model::ConfigurationRecord;
use crate::registry::ConfigurationRegistry;

/// Caller-supplied record comparator.
pub type Comparator = Arc<dyn Fn(&ConfigurationRecord, &ConfigurationRecord) -> Ordering + Send + Sync>;

/// Compares by display name.
pub fn by_name() -> Comparator {
    Arc::new(|a, b| a.name.cmp(&b.name))
}

/// Compares by position in `ids` (unique ids); unlisted records go last.
pub fn by_custom_order(ids: &[String]) -> Comparator {
    let index: HashMap<String, usize> = ids
        .iter()
        .enumerate()
        .map(|(i, id)| (id.clone(), i))
        .collect();
    Arc::new(move |a, b| {
        let ia = index.get(&a.unique_id()).copied().unwrap_or(usize::MAX);
        let ib = index.get(&b.unique_id()).copied().unwrap_or(usize::MAX);
        ia.cmp(&ib)
    })
}

/// Sorts `records` in place.
pub(crate) fn sort_records(
    records: &mut [Arc<ConfigurationRecord>],
    registry: &ConfigurationRegistry,
    comparator: Option<&Comparator>,
    grouping: bool,
) {
    if !grouping {
        if let Some(cmp) = comparator {
            records.sort_by(|a, b| cmp(a, b));
        }
        return;
    }

    let mut type_ranks: HashMap<&str, usize> = HashMap::new();
    let mut folder_ranks: HashMap<&str, usize> = HashMap::new();
    for rec in records.iter() {
        type_ranks
            .entry(rec.type_id.as_str())
            .or_insert_with(|| registry.type_rank(&rec.type_id));
        if let Some(folder) = rec.folder.as_deref() {
            let next = folder_ranks.len();
            folder_ranks.entry(folder).or_insert(next);
        }
    }
    // Keys borrow from the records; snapshot them before reordering.
    let keys: HashMap<_, _> = records
        .iter()
        .map(|rec| {
            let key = (
                type_ranks[rec.type_id.as_str()],
                rec.folder
                    .as_deref()
                    .map_or(usize::MAX, |f| folder_ranks[f]),
                rec.temporary,
            );
            (rec.handle(), key)
        })
        .collect();

    records.sort_by(|a, b| {
        keys[&a.handle()]
            .cmp(&keys[&b.handle()])
            .then_with(|| comparator.map_or(Ordering::Equal, |cmp| cmp(a, b)))
    });
}
