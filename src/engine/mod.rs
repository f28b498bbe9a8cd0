//! License engine: issuance, verification and administrative state changes.
//!
//! All timestamps come from the injected [`Clock`]. Every verification
//! writes a usage log entry and every mutation writes an admin log entry
//! through the [`AuditSink`].

mod keygen;
mod verify;

pub use keygen::{
    FALLBACK_TAIL_LEN, KeyFormat, MAX_CUSTOM_LENGTH, MIN_CUSTOM_LENGTH, generate_key,
    validate_key_format,
};
pub use verify::{VerifyFailure, VerifyResult, VerifyStatus, VerifySuccess, remaining_days};

use std::sync::Arc;

use rusqlite::TransactionBehavior;

use crate::audit::{AuditSink, Origin};
use crate::clock::{Clock, SECONDS_PER_DAY};
use crate::db::DbPool;
use crate::db::queries::{self, NewLicense};
use crate::error::{AppError, Result};
use crate::models::{AdminAction, AdminLog, License, LicenseFilter, LicenseStats, UsageLog};

pub const MIN_DURATION_DAYS: i64 = 1;
pub const MAX_DURATION_DAYS: i64 = 3650;
pub const MIN_EXTEND_DAYS: i64 = 1;
pub const MAX_EXTEND_DAYS: i64 = 365;
pub const MAX_BATCH_SIZE: usize = 100;
/// Longest log retention accepted; 0 means keep everything.
pub const MAX_RETENTION_DAYS: i64 = 36500;

/// Attempts at drawing an unused key before giving up.
const KEY_GENERATION_ATTEMPTS: usize = 5;

#[derive(Clone)]
pub struct LicenseEngine {
    db: DbPool,
    audit: AuditSink,
    clock: Arc<dyn Clock>,
    key_format: KeyFormat,
}

impl LicenseEngine {
    pub fn new(db: DbPool, audit: AuditSink, clock: Arc<dyn Clock>, key_format: KeyFormat) -> Self {
        Self {
            db,
            audit,
            clock,
            key_format,
        }
    }

    pub fn key_format(&self) -> &KeyFormat {
        &self.key_format
    }

    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    // ============ Issuance ============

    /// Issue one license. Reuses the smallest id freed by a delete before
    /// falling back to the next sequential id.
    pub fn issue(
        &self,
        duration_days: i64,
        key_override: Option<&str>,
        format: Option<&KeyFormat>,
        origin: &Origin,
    ) -> Result<License> {
        let license = self.issue_unlogged(duration_days, key_override, format)?;
        self.audit.record_admin(
            AdminAction::CreateLicense,
            &format!(
                "Created license {} (id {}, {} days)",
                license.license_key, license.id, license.duration_days
            ),
            origin,
            self.now(),
        )?;
        tracing::info!(license_id = license.id, "Issued license");
        Ok(license)
    }

    /// Issue `count` licenses one after another. A failure part way through
    /// leaves the licenses issued before it in place.
    pub fn issue_batch(
        &self,
        count: usize,
        duration_days: i64,
        format: Option<&KeyFormat>,
        origin: &Origin,
    ) -> Result<Vec<License>> {
        if !(1..=MAX_BATCH_SIZE).contains(&count) {
            return Err(AppError::Validation(format!(
                "Batch count must be between 1 and {}",
                MAX_BATCH_SIZE
            )));
        }
        validate_duration(duration_days)?;
        if let Some(format) = format {
            format.validate_custom()?;
        }

        let mut issued = Vec::with_capacity(count);
        for _ in 0..count {
            match self.issue_unlogged(duration_days, None, format) {
                Ok(license) => issued.push(license),
                Err(e) => {
                    self.record_partial_batch(issued.len(), count, duration_days, &e, origin);
                    return Err(e);
                }
            }
        }

        self.audit.record_admin(
            AdminAction::BatchCreateLicense,
            &format!("Created {} licenses ({} days)", issued.len(), duration_days),
            origin,
            self.now(),
        )?;
        tracing::info!(count = issued.len(), "Issued license batch");
        Ok(issued)
    }

    /// Audit the licenses a failed batch left behind. The batch error is
    /// what the caller sees, so a failure to write this entry is only logged.
    fn record_partial_batch(
        &self,
        issued: usize,
        requested: usize,
        duration_days: i64,
        cause: &AppError,
        origin: &Origin,
    ) {
        if issued == 0 {
            return;
        }
        tracing::warn!(issued, requested, "License batch failed part way: {}", cause);
        if let Err(e) = self.audit.record_admin(
            AdminAction::BatchCreateLicense,
            &format!(
                "Created {} of {} licenses ({} days) before failing: {}",
                issued, requested, duration_days, cause
            ),
            origin,
            self.now(),
        ) {
            tracing::error!("Failed to record partial license batch: {}", e);
        }
    }

    fn issue_unlogged(
        &self,
        duration_days: i64,
        key_override: Option<&str>,
        format: Option<&KeyFormat>,
    ) -> Result<License> {
        validate_duration(duration_days)?;
        if let Some(format) = format {
            format.validate_custom()?;
        }
        let format = format.unwrap_or(&self.key_format);

        let now = self.now();
        let mut conn = self.db.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let license_key = match key_override.map(str::trim) {
            Some("") => return Err(AppError::Validation("License key must not be empty".into())),
            Some(key) => {
                if queries::license_key_exists(&tx, key)? {
                    return Err(AppError::Conflict(format!("License key {} already exists", key)));
                }
                key.to_string()
            }
            None => unused_key(&tx, format)?,
        };

        let id = queries::find_reusable_license_id(&tx)?;
        let license = queries::create_license(
            &tx,
            id,
            &NewLicense {
                license_key: &license_key,
                duration_days,
                expires_at: now + duration_days * SECONDS_PER_DAY,
            },
            now,
        )?;
        tx.commit()?;

        Ok(license)
    }

    // ============ Verification ============

    /// Verify `license_key` for `machine_code`, binding on first use.
    ///
    /// The outcome is recorded in the usage log whether it succeeds or not.
    pub fn verify(
        &self,
        license_key: &str,
        machine_code: &str,
        origin: &Origin,
    ) -> Result<VerifyResult> {
        let now = self.now();
        let result = {
            let conn = self.db.get()?;
            verify::run(&conn, license_key, machine_code, now)?
        };

        self.audit
            .record_usage(license_key, machine_code, result.status_text(), origin, now)?;
        tracing::debug!(status = result.status_text(), "License verification");
        Ok(result)
    }

    // ============ Administration ============

    pub fn get(&self, id: i64) -> Result<License> {
        let conn = self.db.get()?;
        queries::get_license_by_id(&conn, id)?.ok_or_else(license_not_found)
    }

    pub fn get_by_key(&self, license_key: &str) -> Result<Option<License>> {
        let conn = self.db.get()?;
        queries::get_license_by_key(&conn, license_key)
    }

    pub fn list(
        &self,
        filter: &LicenseFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<License>, i64)> {
        let conn = self.db.get()?;
        queries::list_licenses_paginated(&conn, filter, limit, offset)
    }

    pub fn stats(&self) -> Result<LicenseStats> {
        let conn = self.db.get()?;
        queries::license_stats(&conn, self.now())
    }

    pub fn disable(&self, id: i64, origin: &Origin) -> Result<License> {
        self.mutate(id, AdminAction::DisableLicense, origin, |conn, now| {
            queries::disable_license(conn, id, now)
        })
    }

    /// Lift a disable. Bound licenses return to `used`, unbound to `unused`.
    pub fn enable(&self, id: i64, origin: &Origin) -> Result<License> {
        self.mutate(id, AdminAction::EnableLicense, origin, |conn, now| {
            queries::enable_license(conn, id, now)
        })
    }

    pub fn unbind(&self, id: i64, origin: &Origin) -> Result<License> {
        self.mutate(id, AdminAction::UnbindLicense, origin, |conn, now| {
            queries::unbind_license(conn, id, now)
        })
    }

    /// Add `days` to the current expiry.
    pub fn extend(&self, id: i64, days: i64, origin: &Origin) -> Result<License> {
        if !(MIN_EXTEND_DAYS..=MAX_EXTEND_DAYS).contains(&days) {
            return Err(AppError::Validation(format!(
                "Extend days must be between {} and {}",
                MIN_EXTEND_DAYS, MAX_EXTEND_DAYS
            )));
        }
        self.mutate(id, AdminAction::ExtendLicense, origin, |conn, now| {
            queries::extend_license(conn, id, days, now)
        })
    }

    pub fn set_note(&self, id: i64, note: Option<&str>, origin: &Origin) -> Result<License> {
        let note = note.map(str::trim).filter(|n| !n.is_empty());
        self.mutate(id, AdminAction::UpdateLicense, origin, |conn, now| {
            queries::update_license_note(conn, id, note, now)
        })
    }

    /// Delete a license and make its id available to the next issuance.
    pub fn delete(&self, id: i64, origin: &Origin) -> Result<()> {
        let license = {
            let mut conn = self.db.get()?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let license = queries::get_license_by_id(&tx, id)?.ok_or_else(license_not_found)?;
            queries::delete_license(&tx, id)?;
            queries::sync_license_sequence(&tx)?;
            tx.commit()?;
            license
        };

        self.audit.record_admin(
            AdminAction::DeleteLicense,
            &format!("Deleted license {} (id {})", license.license_key, id),
            origin,
            self.now(),
        )?;
        tracing::info!(license_id = id, "Deleted license");
        Ok(())
    }

    /// Renumber every license to a dense 1..N sequence in one exclusive
    /// transaction. Returns N.
    pub fn reorder_ids(&self, origin: &Origin) -> Result<usize> {
        let count = {
            let mut conn = self.db.get()?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let count = queries::reorder_license_ids(&tx)?;
            tx.commit()?;
            count
        };

        self.audit.record_admin(
            AdminAction::ReorderIds,
            &format!("Reordered {} license ids", count),
            origin,
            self.now(),
        )?;
        tracing::info!(count, "Reordered license ids");
        Ok(count)
    }

    fn mutate<F>(&self, id: i64, action: AdminAction, origin: &Origin, apply: F) -> Result<License>
    where
        F: FnOnce(&rusqlite::Connection, i64) -> Result<bool>,
    {
        let now = self.now();
        let license = {
            let conn = self.db.get()?;
            if !apply(&conn, now)? {
                return Err(license_not_found());
            }
            queries::get_license_by_id(&conn, id)?.ok_or_else(license_not_found)?
        };

        self.audit.record_admin(
            action,
            &format!("License {} (id {})", license.license_key, id),
            origin,
            now,
        )?;
        tracing::info!(license_id = id, action = action.as_ref(), "License updated");
        Ok(license)
    }

    // ============ Audit logs ============

    pub fn usage_logs(
        &self,
        license_key: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<UsageLog>, i64)> {
        let conn = self.audit.pool().get()?;
        queries::list_usage_logs_paginated(&conn, license_key, limit, offset)
    }

    pub fn admin_logs(&self, limit: i64, offset: i64) -> Result<(Vec<AdminLog>, i64)> {
        let conn = self.audit.pool().get()?;
        queries::list_admin_logs_paginated(&conn, limit, offset)
    }

    /// Drop usage logs older than `retention_days`. Zero keeps everything.
    pub fn purge_usage_logs(&self, retention_days: i64) -> Result<usize> {
        validate_retention(retention_days)?;
        if retention_days == 0 {
            return Ok(0);
        }
        let conn = self.audit.pool().get()?;
        queries::purge_old_usage_logs(&conn, retention_days, self.now())
    }

    /// Drop admin logs older than `retention_days`. Zero keeps everything.
    pub fn purge_admin_logs(&self, retention_days: i64) -> Result<usize> {
        validate_retention(retention_days)?;
        if retention_days == 0 {
            return Ok(0);
        }
        let conn = self.audit.pool().get()?;
        queries::purge_old_admin_logs(&conn, retention_days, self.now())
    }

    /// Purge both audit logs on demand and record it in the admin log.
    pub fn purge_logs(
        &self,
        usage_retention_days: i64,
        admin_retention_days: i64,
        origin: &Origin,
    ) -> Result<(usize, usize)> {
        validate_retention(usage_retention_days)?;
        validate_retention(admin_retention_days)?;
        let usage = self.purge_usage_logs(usage_retention_days)?;
        let admin = self.purge_admin_logs(admin_retention_days)?;
        self.audit.record_admin(
            AdminAction::PurgeLogs,
            &format!("Purged {} usage logs and {} admin logs", usage, admin),
            origin,
            self.now(),
        )?;
        tracing::info!(usage, admin, "Purged audit logs");
        Ok((usage, admin))
    }
}

fn validate_duration(duration_days: i64) -> Result<()> {
    if !(MIN_DURATION_DAYS..=MAX_DURATION_DAYS).contains(&duration_days) {
        return Err(AppError::Validation(format!(
            "Duration must be between {} and {} days",
            MIN_DURATION_DAYS, MAX_DURATION_DAYS
        )));
    }
    Ok(())
}

fn validate_retention(retention_days: i64) -> Result<()> {
    if !(0..=MAX_RETENTION_DAYS).contains(&retention_days) {
        return Err(AppError::Validation(format!(
            "Retention must be between 0 and {} days",
            MAX_RETENTION_DAYS
        )));
    }
    Ok(())
}

fn unused_key(conn: &rusqlite::Connection, format: &KeyFormat) -> Result<String> {
    for _ in 0..KEY_GENERATION_ATTEMPTS {
        let key = generate_key(format)?;
        if !queries::license_key_exists(conn, &key)? {
            return Ok(key);
        }
        tracing::warn!("Generated license key collided, retrying");
    }
    Err(AppError::Internal("Could not generate an unused license key".into()))
}

fn license_not_found() -> AppError {
    AppError::NotFound("License not found".into())
}
