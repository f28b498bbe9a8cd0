use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, ToSql, params};

use super::from_row::{ADMIN_LOG_COLS, LICENSE_COLS, USAGE_LOG_COLS, query_all, query_one};
use crate::clock::SECONDS_PER_DAY;
use crate::error::{AppError, Result};
use crate::models::*;

/// Window used for the `expiring_soon` statistic.
const EXPIRING_SOON_SECS: i64 = 7 * SECONDS_PER_DAY;

fn as_sql_params(values: &[Value]) -> Vec<&dyn ToSql> {
    values.iter().map(|v| v as &dyn ToSql).collect()
}

// ============ Licenses ============

pub struct NewLicense<'a> {
    pub license_key: &'a str,
    pub duration_days: i64,
    pub expires_at: i64,
}

/// Smallest id freed by a delete: `n + 1` where row `n` exists, `n + 1`
/// does not, and `n` is below the current maximum. `None` when ids are dense.
pub fn find_reusable_license_id(conn: &Connection) -> Result<Option<i64>> {
    let id = conn
        .query_row(
            "SELECT t1.id + 1
             FROM licenses t1
             LEFT JOIN licenses t2 ON t2.id = t1.id + 1
             WHERE t2.id IS NULL
               AND t1.id < (SELECT MAX(id) FROM licenses)
             ORDER BY t1.id
             LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

pub fn license_key_exists(conn: &Connection, license_key: &str) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM licenses WHERE license_key = ?1)",
        params![license_key],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Insert a license. With `id = None` SQLite allocates the next sequential id.
pub fn create_license(
    conn: &Connection,
    id: Option<i64>,
    input: &NewLicense,
    now: i64,
) -> Result<License> {
    let sql = format!(
        "INSERT INTO licenses (id, license_key, status, duration_days, expires_at, created_at, updated_at)
         VALUES (?1, ?2, 'unused', ?3, ?4, ?5, ?5)
         RETURNING {}",
        LICENSE_COLS
    );
    query_one(
        conn,
        &sql,
        params![id, input.license_key, input.duration_days, input.expires_at, now],
    )?
    .ok_or_else(|| AppError::Internal("Insert returned no row".into()))
}

pub fn get_license_by_id(conn: &Connection, id: i64) -> Result<Option<License>> {
    query_one(
        conn,
        &format!("SELECT {} FROM licenses WHERE id = ?1", LICENSE_COLS),
        params![id],
    )
}

pub fn get_license_by_key(conn: &Connection, license_key: &str) -> Result<Option<License>> {
    query_one(
        conn,
        &format!("SELECT {} FROM licenses WHERE license_key = ?1", LICENSE_COLS),
        params![license_key],
    )
}

/// Bind an unbound license to `machine_code` in a single conditional update.
///
/// Returns false when another request bound it first, it was disabled or
/// expired in the meantime, or its id was renumbered; the caller re-reads
/// and decides again.
pub fn bind_license_machine(
    conn: &Connection,
    license: &License,
    machine_code: &str,
    now: i64,
) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE licenses
         SET machine_code = ?1, status = 'used', last_used_at = ?2, updated_at = ?2
         WHERE id = ?3
           AND license_key = ?4
           AND machine_code IS NULL
           AND status != 'disabled'
           AND expires_at >= ?2",
        params![machine_code, now, license.id, license.license_key],
    )?;
    Ok(updated == 1)
}

/// Record a verification from the bound machine, provided the license is
/// still bound to `machine_code`, enabled and unexpired.
///
/// Returns false when the row changed since it was read.
pub fn touch_license(
    conn: &Connection,
    license: &License,
    machine_code: &str,
    now: i64,
) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE licenses SET last_used_at = ?1
         WHERE id = ?2
           AND license_key = ?3
           AND machine_code = ?4
           AND status = 'used'
           AND expires_at >= ?1",
        params![now, license.id, license.license_key, machine_code],
    )?;
    Ok(updated == 1)
}

pub fn disable_license(conn: &Connection, id: i64, now: i64) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE licenses SET status = 'disabled', updated_at = ?1 WHERE id = ?2",
        params![now, id],
    )?;
    Ok(updated > 0)
}

/// Re-enable a license: `used` when bound, `unused` otherwise.
pub fn enable_license(conn: &Connection, id: i64, now: i64) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE licenses
         SET status = CASE WHEN machine_code IS NULL THEN 'unused' ELSE 'used' END,
             updated_at = ?1
         WHERE id = ?2",
        params![now, id],
    )?;
    Ok(updated > 0)
}

/// Clear the machine binding. A disabled license stays disabled.
pub fn unbind_license(conn: &Connection, id: i64, now: i64) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE licenses
         SET machine_code = NULL,
             last_used_at = NULL,
             status = CASE WHEN status = 'disabled' THEN 'disabled' ELSE 'unused' END,
             updated_at = ?1
         WHERE id = ?2",
        params![now, id],
    )?;
    Ok(updated > 0)
}

/// Push the expiry out by `days`, relative to the stored expiry.
pub fn extend_license(conn: &Connection, id: i64, days: i64, now: i64) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE licenses SET expires_at = expires_at + ?1, updated_at = ?2 WHERE id = ?3",
        params![days * SECONDS_PER_DAY, now, id],
    )?;
    Ok(updated > 0)
}

pub fn update_license_note(
    conn: &Connection,
    id: i64,
    note: Option<&str>,
    now: i64,
) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE licenses SET machine_note = ?1, updated_at = ?2 WHERE id = ?3",
        params![note, now, id],
    )?;
    Ok(updated > 0)
}

pub fn delete_license(conn: &Connection, id: i64) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM licenses WHERE id = ?1", params![id])?;
    Ok(deleted > 0)
}

/// Point the id generator at the current maximum id so a deleted tail id is
/// handed out again.
pub fn sync_license_sequence(conn: &Connection) -> Result<()> {
    conn.execute(
        "UPDATE sqlite_sequence
         SET seq = (SELECT COALESCE(MAX(id), 0) FROM licenses)
         WHERE name = 'licenses'",
        [],
    )?;
    Ok(())
}

/// Renumber all licenses to 1..N preserving id order. Must run inside a
/// write transaction; returns N.
pub fn reorder_license_ids(conn: &Connection) -> Result<usize> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM licenses", [], |row| row.get(0))?;
    if count == 0 {
        return Ok(0);
    }

    conn.execute_batch(
        r#"
        DROP TABLE IF EXISTS temp.licenses_reorder;
        CREATE TEMP TABLE licenses_reorder AS
            SELECT ROW_NUMBER() OVER (ORDER BY id) AS new_id,
                   license_key, status, machine_code, duration_days, expires_at,
                   last_used_at, machine_note, created_at, updated_at
            FROM licenses;
        DELETE FROM licenses;
        INSERT INTO licenses (id, license_key, status, machine_code, duration_days, expires_at,
                              last_used_at, machine_note, created_at, updated_at)
            SELECT new_id, license_key, status, machine_code, duration_days, expires_at,
                   last_used_at, machine_note, created_at, updated_at
            FROM licenses_reorder
            ORDER BY new_id;
        DROP TABLE temp.licenses_reorder;
        "#,
    )?;
    conn.execute(
        "UPDATE sqlite_sequence SET seq = ?1 WHERE name = 'licenses'",
        params![count],
    )?;

    Ok(count as usize)
}

/// Newest-first license listing with optional status and substring filters.
pub fn list_licenses_paginated(
    conn: &Connection,
    filter: &LicenseFilter,
    limit: i64,
    offset: i64,
) -> Result<(Vec<License>, i64)> {
    let mut conditions: Vec<String> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    if let Some(status) = filter.status {
        values.push(status.as_ref().to_string().into());
        conditions.push(format!("status = ?{}", values.len()));
    }
    if let Some(search) = filter.search.as_deref().map(str::trim)
        && !search.is_empty()
    {
        values.push(format!("%{}%", search).into());
        let n = values.len();
        conditions.push(format!(
            "(license_key LIKE ?{n} OR machine_code LIKE ?{n} OR machine_note LIKE ?{n})"
        ));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM licenses {}", where_clause),
        as_sql_params(&values).as_slice(),
        |row| row.get(0),
    )?;

    let limit_idx = values.len() + 1;
    let offset_idx = values.len() + 2;
    values.push(limit.into());
    values.push(offset.into());
    let items = query_all(
        conn,
        &format!(
            "SELECT {} FROM licenses {} ORDER BY id DESC LIMIT ?{} OFFSET ?{}",
            LICENSE_COLS, where_clause, limit_idx, offset_idx
        ),
        as_sql_params(&values).as_slice(),
    )?;

    Ok((items, total))
}

pub fn license_stats(conn: &Connection, now: i64) -> Result<LicenseStats> {
    let stats = conn.query_row(
        "SELECT COUNT(*),
                COALESCE(SUM(status = 'unused'), 0),
                COALESCE(SUM(status = 'used'), 0),
                COALESCE(SUM(status = 'disabled'), 0),
                COALESCE(SUM(expires_at < ?1), 0),
                COALESCE(SUM(expires_at >= ?1 AND expires_at <= ?2), 0)
         FROM licenses",
        params![now, now + EXPIRING_SOON_SECS],
        |row| {
            Ok(LicenseStats {
                total: row.get(0)?,
                unused: row.get(1)?,
                used: row.get(2)?,
                disabled: row.get(3)?,
                expired: row.get(4)?,
                expiring_soon: row.get(5)?,
            })
        },
    )?;
    Ok(stats)
}

// ============ Usage Logs ============

/// Oldest `created_at` kept by a purge with `retention_days`.
fn retention_cutoff(retention_days: i64, now: i64) -> Result<i64> {
    retention_days
        .checked_mul(SECONDS_PER_DAY)
        .and_then(|secs| now.checked_sub(secs))
        .ok_or_else(|| {
            AppError::Validation(format!("Retention of {} days is out of range", retention_days))
        })
}

pub fn create_usage_log(
    conn: &Connection,
    license_key: &str,
    machine_code: &str,
    status: &str,
    ip_address: Option<&str>,
    user_agent: Option<&str>,
    now: i64,
) -> Result<()> {
    conn.execute(
        "INSERT INTO usage_logs (license_key, machine_code, status, ip_address, user_agent, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![license_key, machine_code, status, ip_address, user_agent, now],
    )?;
    Ok(())
}

pub fn list_usage_logs_paginated(
    conn: &Connection,
    license_key: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<(Vec<UsageLog>, i64)> {
    match license_key {
        Some(key) => {
            let total: i64 = conn.query_row(
                "SELECT COUNT(*) FROM usage_logs WHERE license_key = ?1",
                params![key],
                |row| row.get(0),
            )?;
            let items = query_all(
                conn,
                &format!(
                    "SELECT {} FROM usage_logs WHERE license_key = ?1
                     ORDER BY created_at DESC, id DESC LIMIT ?2 OFFSET ?3",
                    USAGE_LOG_COLS
                ),
                params![key, limit, offset],
            )?;
            Ok((items, total))
        }
        None => {
            let total: i64 =
                conn.query_row("SELECT COUNT(*) FROM usage_logs", [], |row| row.get(0))?;
            let items = query_all(
                conn,
                &format!(
                    "SELECT {} FROM usage_logs ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2",
                    USAGE_LOG_COLS
                ),
                params![limit, offset],
            )?;
            Ok((items, total))
        }
    }
}

/// Delete usage logs older than `retention_days`. Returns the number removed.
pub fn purge_old_usage_logs(conn: &Connection, retention_days: i64, now: i64) -> Result<usize> {
    let cutoff = retention_cutoff(retention_days, now)?;
    let deleted = conn.execute(
        "DELETE FROM usage_logs WHERE created_at < ?1",
        params![cutoff],
    )?;
    Ok(deleted)
}

// ============ Admin Logs ============

pub fn create_admin_log(
    conn: &Connection,
    action: AdminAction,
    detail: Option<&str>,
    ip_address: Option<&str>,
    user_agent: Option<&str>,
    now: i64,
) -> Result<()> {
    conn.execute(
        "INSERT INTO admin_logs (action, detail, ip_address, user_agent, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![action.as_ref(), detail, ip_address, user_agent, now],
    )?;
    Ok(())
}

pub fn list_admin_logs_paginated(
    conn: &Connection,
    limit: i64,
    offset: i64,
) -> Result<(Vec<AdminLog>, i64)> {
    let total: i64 = conn.query_row("SELECT COUNT(*) FROM admin_logs", [], |row| row.get(0))?;
    let items = query_all(
        conn,
        &format!(
            "SELECT {} FROM admin_logs ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2",
            ADMIN_LOG_COLS
        ),
        params![limit, offset],
    )?;
    Ok((items, total))
}

/// Delete admin logs older than `retention_days`. Returns the number removed.
pub fn purge_old_admin_logs(conn: &Connection, retention_days: i64, now: i64) -> Result<usize> {
    let cutoff = retention_cutoff(retention_days, now)?;
    let deleted = conn.execute(
        "DELETE FROM admin_logs WHERE created_at < ?1",
        params![cutoff],
    )?;
    Ok(deleted)
}
