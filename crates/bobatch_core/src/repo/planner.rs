//! Graph save planner.
//!
//! # Responsibility
//! - Turn one business-object node (and optionally its savable descendants)
//!   into an ordered statement list.
//!
//! # Invariants
//! - Non-persistable nodes yield nothing and their children are not visited.
//! - Updates are rendered as delete followed by insert, never as a partial update.
//! - A node's statements always precede those of its children; children are
//!   visited depth-first in field order.

use crate::adapter::BoAdapter;
use crate::model::business_object::BusinessObject;
use crate::model::statement::SqlStatement;
use crate::repo::error::RepoResult;

/// Plans the statements that persist `node`.
///
/// `recurse` is forwarded unchanged to every child.
pub fn plan_save(
    adapter: &dyn BoAdapter,
    node: &mut BusinessObject,
    recurse: bool,
) -> RepoResult<Vec<SqlStatement>> {
    let mut statements = Vec::new();
    plan_into(adapter, node, recurse, &mut statements)?;
    Ok(statements)
}

fn plan_into(
    adapter: &dyn BoAdapter,
    node: &mut BusinessObject,
    recurse: bool,
    out: &mut Vec<SqlStatement>,
) -> RepoResult<()> {
    if !node.is_persistable() {
        return Ok(());
    }

    adapter.tag_storage(node);
    if node.is_new() {
        out.push(adapter.render_insert(node)?);
    } else if node.is_deleted() {
        out.push(adapter.render_delete(node)?);
    } else {
        out.push(adapter.render_delete(node)?);
        out.push(adapter.render_insert(node)?);
    }

    if recurse {
        for child in node.savable_children_mut() {
            plan_into(adapter, child, recurse, out)?;
        }
    }
    Ok(())
}
