//! Primary-key and series-number allocation.
//!
//! # Responsibility
//! - Reserve keys for a whole root set in one pass before any statement is
//!   rendered, so cross-references among roots see stable keys.
//!
//! # Invariants
//! - Only new, persistable objects without a key receive one.
//! - Keys are reserved per object code in contiguous blocks and never reused.
//! - Allocation runs on the caller's connection, inside the caller's transaction.

use crate::model::business_object::BusinessObject;
use crate::repo::command::DbCommand;
use crate::repo::RepoResult;
use rusqlite::{params, Connection};
use std::collections::BTreeMap;

/// Key allocation collaborator.
pub trait KeysManager: Send + Sync {
    /// Assigns primary keys to every new object in the root set, children included.
    fn use_primary_keys(
        &self,
        bos: &mut [BusinessObject],
        command: &DbCommand<'_>,
    ) -> RepoResult<()>;

    /// Assigns series numbers to new roots that declare a series.
    fn use_series_keys(&self, bos: &mut [BusinessObject], command: &DbCommand<'_>)
        -> RepoResult<()>;
}

/// Counter-table allocator over `bo_keys` / `bo_series`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteKeysManager;

impl KeysManager for SqliteKeysManager {
    fn use_primary_keys(
        &self,
        bos: &mut [BusinessObject],
        command: &DbCommand<'_>,
    ) -> RepoResult<()> {
        let mut demand: BTreeMap<String, i64> = BTreeMap::new();
        for bo in bos.iter() {
            count_missing_keys(bo, &mut demand);
        }
        if demand.is_empty() {
            return Ok(());
        }

        let mut next_keys = BTreeMap::new();
        for (object_code, count) in demand {
            let first = reserve_keys(command.connection(), &object_code, count)?;
            next_keys.insert(object_code, first);
        }
        for bo in bos.iter_mut() {
            assign_keys(bo, &mut next_keys);
        }
        Ok(())
    }

    fn use_series_keys(
        &self,
        bos: &mut [BusinessObject],
        command: &DbCommand<'_>,
    ) -> RepoResult<()> {
        for bo in bos.iter_mut().filter(|bo| needs_series_key(bo)) {
            let Some(series) = bo.series else {
                continue;
            };
            let number = reserve_series_number(command.connection(), bo.object_code(), series)?;
            bo.series_key = Some(number);
        }
        Ok(())
    }
}

fn needs_key(bo: &BusinessObject) -> bool {
    bo.is_persistable() && bo.is_new() && bo.primary_key.is_none()
}

fn needs_series_key(bo: &BusinessObject) -> bool {
    bo.is_persistable() && bo.is_new() && bo.series.is_some() && bo.series_key.is_none()
}

fn count_missing_keys(bo: &BusinessObject, demand: &mut BTreeMap<String, i64>) {
    if !bo.is_persistable() {
        return;
    }
    if needs_key(bo) {
        *demand.entry(bo.object_code().to_string()).or_insert(0) += 1;
    }
    for child in bo.savable_children() {
        count_missing_keys(child, demand);
    }
}

fn assign_keys(bo: &mut BusinessObject, next_keys: &mut BTreeMap<String, i64>) {
    if !bo.is_persistable() {
        return;
    }
    if needs_key(bo) {
        if let Some(next) = next_keys.get_mut(bo.object_code()) {
            bo.primary_key = Some(*next);
            *next += 1;
        }
    }
    for child in bo.savable_children_mut() {
        assign_keys(child, next_keys);
    }
}

/// Reserves `count` keys and returns the first one.
fn reserve_keys(conn: &Connection, object_code: &str, count: i64) -> RepoResult<i64> {
    let first = conn.query_row(
        "INSERT INTO bo_keys (object_code, next_key)
         VALUES (?1, 1 + ?2)
         ON CONFLICT(object_code) DO UPDATE SET next_key = next_key + ?2
         RETURNING next_key - ?2;",
        params![object_code, count],
        |row| row.get::<_, i64>(0),
    )?;
    Ok(first)
}

fn reserve_series_number(conn: &Connection, object_code: &str, series: i64) -> RepoResult<i64> {
    let number = conn.query_row(
        "INSERT INTO bo_series (object_code, series, next_number)
         VALUES (?1, ?2, 2)
         ON CONFLICT(object_code, series) DO UPDATE SET next_number = next_number + 1
         RETURNING next_number - 1;",
        params![object_code, series],
        |row| row.get::<_, i64>(0),
    )?;
    Ok(number)
}

#[cfg(test)]
mod tests {
    use super::{KeysManager, SqliteKeysManager};
    use crate::db::open_db_in_memory;
    use crate::model::business_object::BusinessObject;
    use crate::repo::command::DbCommand;

    #[test]
    fn assigns_contiguous_keys_per_object_code_including_children() {
        let conn = open_db_in_memory().expect("in-memory db");
        let command = DbCommand::new(&conn);

        let mut order = BusinessObject::new("SalesOrder");
        order.push_child("lines", BusinessObject::new("SalesOrderLine"));
        order.push_child("lines", BusinessObject::new("SalesOrderLine"));
        let mut roots = vec![order, BusinessObject::new("SalesOrder")];

        SqliteKeysManager
            .use_primary_keys(&mut roots, &command)
            .expect("keys reserved");

        assert_eq!(roots[0].primary_key, Some(1));
        assert_eq!(roots[1].primary_key, Some(2));
        let line_keys: Vec<_> = roots[0]
            .savable_children()
            .map(|line| line.primary_key)
            .collect();
        assert_eq!(line_keys, vec![Some(1), Some(2)]);

        let mut later = vec![BusinessObject::new("SalesOrder")];
        SqliteKeysManager
            .use_primary_keys(&mut later, &command)
            .expect("keys reserved");
        assert_eq!(later[0].primary_key, Some(3));
    }

    #[test]
    fn keeps_existing_keys_and_numbers_series_per_code() {
        let conn = open_db_in_memory().expect("in-memory db");
        let command = DbCommand::new(&conn);

        let mut keyed = BusinessObject::new("Invoice");
        keyed.primary_key = Some(42);
        keyed.series = Some(1);
        let mut other = BusinessObject::new("Invoice");
        other.series = Some(1);
        let mut roots = vec![keyed, other];

        SqliteKeysManager
            .use_primary_keys(&mut roots, &command)
            .expect("keys reserved");
        SqliteKeysManager
            .use_series_keys(&mut roots, &command)
            .expect("series reserved");

        assert_eq!(roots[0].primary_key, Some(42));
        assert_eq!(roots[1].primary_key, Some(1));
        assert_eq!(roots[0].series_key, Some(1));
        assert_eq!(roots[1].series_key, Some(2));
    }
}
