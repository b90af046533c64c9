//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `bobatch_core` linkage with ping/version output.
//! - Start file logging under `BOBATCH_LOG_DIR`, or a temp directory.
//! - Save a sample order graph into an in-memory database and print a
//!   deterministic JSON summary.

use bobatch_core::{
    BoRepository, BoRepositoryService, BusinessObject, DbSource, LifecycleDispatcher,
    LogicChainRegistry, LogicsRegistry, RepoResult, RepositoryConfig,
};
use serde_json::json;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

const LOG_DIR_ENV: &str = "BOBATCH_LOG_DIR";

fn main() -> ExitCode {
    println!("bobatch_core ping={}", bobatch_core::ping());
    println!("bobatch_core version={}", bobatch_core::core_version());

    let log_dir = log_dir(std::env::var_os(LOG_DIR_ENV));
    match bobatch_core::init_logging(bobatch_core::default_log_level(), &log_dir) {
        Ok(()) => println!("bobatch_core log_dir={}", log_dir.display()),
        // The sample save still runs; only its log output is lost.
        Err(err) => eprintln!("logging disabled: {err}"),
    }

    match run_sample_save() {
        Ok(summary) => {
            println!("{summary}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("sample save failed: {} ({})", err, err.code());
            ExitCode::FAILURE
        }
    }
}

/// Log directory from the `BOBATCH_LOG_DIR` value; must be absolute.
fn log_dir(configured: Option<OsString>) -> PathBuf {
    configured
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("bobatch-logs"))
}

fn run_sample_save() -> RepoResult<serde_json::Value> {
    let config = RepositoryConfig::default();
    let registry = Arc::new(LogicChainRegistry::new(Arc::new(LogicsRegistry::new())));
    let dispatcher = LifecycleDispatcher::new(registry);
    let mut service =
        BoRepositoryService::new(BoRepository::new(DbSource::Memory, &config), dispatcher);
    // Keep the in-memory database alive past the save.
    service.repository_mut().open_db_connection()?;

    let mut order = BusinessObject::new("SalesOrder");
    order.set_value("customer", "C-001");
    for (item, quantity) in [("I-100", 2), ("I-200", 1)] {
        let mut line = BusinessObject::new("SalesOrderLine");
        line.set_value("item", item);
        line.set_value("quantity", quantity);
        order.push_child("lines", line);
    }
    service.save(&mut order)?;

    let conn = service
        .repository()
        .connection()
        .ok_or(bobatch_core::RepoError::ConnectionClosed)?;
    let records: i64 = conn.query_row("SELECT COUNT(*) FROM bo_records", [], |row| row.get(0))?;
    let notifications: i64 =
        conn.query_row("SELECT COUNT(*) FROM bo_transactions", [], |row| row.get(0))?;

    Ok(json!({
        "order_key": order.primary_key,
        "records": records,
        "notifications": notifications,
    }))
}
