//! Verification state machine.
//!
//! Negative outcomes are values, not errors: callers get a [`VerifyResult`]
//! and only I/O problems surface as `AppError`.

use rusqlite::Connection;
use serde::Serialize;
use strum::{AsRefStr, Display};

use crate::clock::SECONDS_PER_DAY;
use crate::db::queries;
use crate::error::{AppError, Result};
use crate::models::{License, LicenseStatus};

/// Conditional write attempts before giving up on a contended license.
const MAX_WRITE_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, AsRefStr, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VerifyStatus {
    /// First verification; the license is now bound to the caller's machine.
    Bound,
    /// The caller's machine matches the existing binding.
    Verified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, AsRefStr, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VerifyFailure {
    NotFound,
    Disabled,
    Expired,
    MachineMismatch,
}

impl VerifyFailure {
    pub fn message(&self) -> &'static str {
        match self {
            VerifyFailure::NotFound => "License not found",
            VerifyFailure::Disabled => "License has been disabled",
            VerifyFailure::Expired => "License has expired",
            VerifyFailure::MachineMismatch => {
                "Machine code does not match, please use the bound device"
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifySuccess {
    pub status: VerifyStatus,
    pub license_id: i64,
    pub expires_at: i64,
    pub remaining_days: i64,
}

impl VerifySuccess {
    pub fn message(&self) -> &'static str {
        match self.status {
            VerifyStatus::Bound => "Verification successful, device bound",
            VerifyStatus::Verified => "Verification successful",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    Success(VerifySuccess),
    Failure(VerifyFailure),
}

impl VerifyResult {
    pub fn is_success(&self) -> bool {
        matches!(self, VerifyResult::Success(_))
    }

    /// Outcome text written to the usage log.
    pub fn status_text(&self) -> &str {
        match self {
            VerifyResult::Success(s) => s.status.as_ref(),
            VerifyResult::Failure(f) => f.as_ref(),
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            VerifyResult::Success(s) => s.message(),
            VerifyResult::Failure(f) => f.message(),
        }
    }
}

/// Whole days left until `expires_at`, rounded up and never negative.
pub fn remaining_days(expires_at: i64, now: i64) -> i64 {
    let secs = expires_at - now;
    if secs <= 0 {
        0
    } else {
        (secs + SECONDS_PER_DAY - 1) / SECONDS_PER_DAY
    }
}

/// What to do with a license that was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Decision {
    Reject(VerifyFailure),
    Bind,
    Touch,
}

pub(crate) fn decide(license: &License, machine_code: &str, now: i64) -> Decision {
    if license.status == LicenseStatus::Disabled {
        return Decision::Reject(VerifyFailure::Disabled);
    }
    if license.is_expired(now) {
        return Decision::Reject(VerifyFailure::Expired);
    }
    match license.machine_code.as_deref() {
        None => Decision::Bind,
        Some(bound) if bound == machine_code => Decision::Touch,
        Some(_) => Decision::Reject(VerifyFailure::MachineMismatch),
    }
}

fn success(license: &License, status: VerifyStatus, now: i64) -> VerifyResult {
    VerifyResult::Success(VerifySuccess {
        status,
        license_id: license.id,
        expires_at: license.expires_at,
        remaining_days: remaining_days(license.expires_at, now),
    })
}

/// Run the state machine against the database.
///
/// Both writes are conditional on the state the decision was made from:
/// binding is a compare-and-swap on `machine_code IS NULL`, and the touch
/// requires the same machine, `used` status and an unexpired row. A write
/// that matches nothing re-reads the license and decides again, so a
/// concurrent bind, disable, unbind or renumbering is never overwritten.
pub(crate) fn run(
    conn: &Connection,
    license_key: &str,
    machine_code: &str,
    now: i64,
) -> Result<VerifyResult> {
    for _ in 0..MAX_WRITE_ATTEMPTS {
        let Some(license) = queries::get_license_by_key(conn, license_key)? else {
            return Ok(VerifyResult::Failure(VerifyFailure::NotFound));
        };

        match decide(&license, machine_code, now) {
            Decision::Reject(reason) => return Ok(VerifyResult::Failure(reason)),
            Decision::Touch => {
                if queries::touch_license(conn, &license, machine_code, now)? {
                    return Ok(success(&license, VerifyStatus::Verified, now));
                }
                tracing::debug!(
                    license_id = license.id,
                    "License changed before touch, re-reading"
                );
            }
            Decision::Bind => {
                if queries::bind_license_machine(conn, &license, machine_code, now)? {
                    return Ok(success(&license, VerifyStatus::Bound, now));
                }
                tracing::debug!(license_id = license.id, "Lost bind race, re-reading license");
            }
        }
    }

    Err(AppError::Internal(format!(
        "License verification for {} did not settle",
        license_key
    )))
}
