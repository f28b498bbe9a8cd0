//! Row mapping trait and helpers for reducing boilerplate in queries.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Parse a string column into an enum type, converting parse errors to rusqlite errors.
///
/// A corrupted status value surfaces as a query error instead of a panic.
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Trait for constructing a type from a database row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const LICENSE_COLS: &str = "id, license_key, status, machine_code, duration_days, expires_at, last_used_at, machine_note, created_at, updated_at";

pub const USAGE_LOG_COLS: &str =
    "id, license_key, machine_code, status, ip_address, user_agent, created_at";

pub const ADMIN_LOG_COLS: &str = "id, action, detail, ip_address, user_agent, created_at";

// ============ FromRow Implementations ============

impl FromRow for License {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(License {
            id: row.get(0)?,
            license_key: row.get(1)?,
            status: parse_enum(row, 2, "status")?,
            machine_code: row.get(3)?,
            duration_days: row.get(4)?,
            expires_at: row.get(5)?,
            last_used_at: row.get(6)?,
            machine_note: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }
}

impl FromRow for UsageLog {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(UsageLog {
            id: row.get(0)?,
            license_key: row.get(1)?,
            machine_code: row.get(2)?,
            status: row.get(3)?,
            ip_address: row.get(4)?,
            user_agent: row.get(5)?,
            created_at: row.get(6)?,
        })
    }
}

impl FromRow for AdminLog {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(AdminLog {
            id: row.get(0)?,
            action: row.get(1)?,
            detail: row.get(2)?,
            ip_address: row.get(3)?,
            user_agent: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}
