//! SQLite connection bootstrap.
//!
//! # Responsibility
//! - Open file-backed or in-memory connections for the store.
//! - Configure pragmas and run internal-table migrations.
//!
//! # Invariants
//! - Returned connections have migrations fully applied.
//! - File connections run in WAL journal mode with a busy timeout.
//! - Every connection provides `fold_case(text)`, a Unicode lowercase fold.

use super::migrations::apply_migrations;
use super::{DbError, DbResult};
use log::{error, info};
use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQL name of the Unicode case-folding function.
pub(crate) const FOLD_CASE_FUNCTION: &str = "fold_case";

/// Opens (creating if needed) a database file and applies pending migrations.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    let path = path.as_ref();
    let location = path.display().to_string();
    open_with("file", &location, || Connection::open(path), |conn| {
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })
        .map_err(|source| DbError::Configure {
            setting: "journal_mode",
            source,
        })?;
        Ok(())
    })
}

/// Opens a private in-memory database and applies pending migrations.
pub fn open_db_in_memory() -> DbResult<Connection> {
    open_with("memory", ":memory:", Connection::open_in_memory, |_| Ok(()))
}

fn open_with<O, C>(mode: &str, location: &str, open: O, configure: C) -> DbResult<Connection>
where
    O: FnOnce() -> rusqlite::Result<Connection>,
    C: FnOnce(&Connection) -> DbResult<()>,
{
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode={mode} location={location}");

    let mut conn = open().map_err(|source| {
        error!(
            "event=db_open module=db status=error mode={mode} location={location} duration_ms={} error_code=db_open_failed error={source}",
            started_at.elapsed().as_millis()
        );
        DbError::Open {
            location: location.to_string(),
            source,
        }
    })?;

    let bootstrap = configure(&conn).and_then(|()| bootstrap_connection(&mut conn));
    match bootstrap {
        Ok(()) => {
            info!(
                "event=db_open module=db status=ok mode={mode} location={location} duration_ms={}",
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={mode} location={location} duration_ms={} error_code=db_bootstrap_failed error={err}",
                started_at.elapsed().as_millis()
            );
            Err(err)
        }
    }
}

fn bootstrap_connection(conn: &mut Connection) -> DbResult<()> {
    conn.busy_timeout(BUSY_TIMEOUT)
        .map_err(|source| DbError::Configure {
            setting: "busy_timeout",
            source,
        })?;
    register_functions(conn)?;
    apply_migrations(conn)
}

fn register_functions(conn: &Connection) -> DbResult<()> {
    conn.create_scalar_function(
        FOLD_CASE_FUNCTION,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let text = ctx.get::<Option<String>>(0)?;
            Ok(text.map(|text| text.to_lowercase()))
        },
    )
    .map_err(|source| DbError::Configure {
        setting: FOLD_CASE_FUNCTION,
        source,
    })
}
