//! The Diff Computer (spec §4.5): change-set computation between two version states read from
//! the Index store. Distinct from `ocfl::inventory::Version`'s own in-memory state comparison --
//! this operates over states the Index store already materialized, not a freshly-parsed
//! inventory, and reuses `ocfl::Diff`'s `Added`/`Modified`/`Deleted` shape for the result.

use std::collections::HashMap;
use std::rc::Rc;

use crate::db::{rows_to_state, IndexStore};
use crate::error::Result;
use crate::ocfl::{Diff, InventoryPath, LogicalPath};

/// Computes `GetVersionChanges(fromV, toV)`. `from_v == 0` means "before version 1" (everything
/// present at `to_v` is `Added`). Returns changes sorted by path ascending.
pub fn compute(
    db: &IndexStore,
    object_db_id: i64,
    padding: u32,
    from_v: u32,
    to_v: u32,
) -> Result<Vec<Diff>> {
    if from_v == to_v {
        return Ok(Vec::new());
    }

    let to_rows = db.list_version_files(object_db_id, to_v, "", padding)?;
    let to_state = rows_to_state(&to_rows);

    let from_state = if from_v == 0 {
        HashMap::new()
    } else {
        let from_rows = db.list_version_files(object_db_id, from_v, "", padding)?;
        rows_to_state(&from_rows)
    };

    diff_states(&from_state, &to_state)
}

/// The pure algorithm (spec §4.5 steps 2-5) over two already-loaded states, split out from
/// `compute` so it can be unit tested without a database.
pub fn diff_states(
    from_state: &HashMap<String, String>,
    to_state: &HashMap<String, String>,
) -> Result<Vec<Diff>> {
    let mut changes = Vec::with_capacity(from_state.len() + to_state.len());

    for (path, digest) in to_state {
        let diff = match from_state.get(path) {
            None => Some(Diff::Added(logical_path(path)?)),
            Some(prior_digest) if prior_digest != digest => Some(Diff::Modified(logical_path(path)?)),
            _ => None,
        };
        if let Some(diff) = diff {
            changes.push(diff);
        }
    }

    for path in from_state.keys() {
        if !to_state.contains_key(path) {
            changes.push(Diff::Deleted(logical_path(path)?));
        }
    }

    changes.sort_by(|a, b| a.path().as_str().cmp(b.path().as_str()));
    Ok(changes)
}

fn logical_path(path: &str) -> Result<Rc<LogicalPath>> {
    Ok(Rc::new(LogicalPath::try_from(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(p, d)| (p.to_string(), d.to_string()))
            .collect()
    }

    #[test]
    fn add_then_modify_reports_modified_before_added_by_path_order() {
        let from = state(&[("a.txt", "d1"), ("b.txt", "d2")]);
        let to = state(&[("a.txt", "d1"), ("b.txt", "d3"), ("c.txt", "d4")]);

        let changes = diff_states(&from, &to).unwrap();

        assert_eq!(2, changes.len());
        assert!(matches!(&changes[0], Diff::Modified(p) if p.as_str() == "b.txt"));
        assert!(matches!(&changes[1], Diff::Added(p) if p.as_str() == "c.txt"));
    }

    #[test]
    fn delete_and_restore_reports_added_from_empty_baseline() {
        let from: HashMap<String, String> = HashMap::new();
        let to = state(&[("readme.txt", "d2")]);

        let changes = diff_states(&from, &to).unwrap();

        assert_eq!(1, changes.len());
        assert!(matches!(&changes[0], Diff::Added(p) if p.as_str() == "readme.txt"));
    }

    #[test]
    fn equal_digest_entries_are_ignored() {
        let from = state(&[("a.txt", "d1")]);
        let to = state(&[("a.txt", "d1")]);
        assert!(diff_states(&from, &to).unwrap().is_empty());
    }

    #[test]
    fn reversing_direction_swaps_added_and_deleted() {
        let from = state(&[("a.txt", "d1")]);
        let to = state(&[("b.txt", "d2")]);

        let forward = diff_states(&from, &to).unwrap();
        assert!(matches!(&forward[0], Diff::Deleted(p) if p.as_str() == "a.txt"));
        assert!(matches!(&forward[1], Diff::Added(p) if p.as_str() == "b.txt"));

        let backward = diff_states(&to, &from).unwrap();
        assert!(matches!(&backward[0], Diff::Added(p) if p.as_str() == "a.txt"));
        assert!(matches!(&backward[1], Diff::Deleted(p) if p.as_str() == "b.txt"));
    }

    #[test]
    fn same_version_on_both_sides_short_circuits_to_no_changes() {
        let db = IndexStore::open(":memory:").unwrap();
        let changes = compute(&db, 1, 0, 3, 3).unwrap();
        assert!(changes.is_empty());
    }
}
