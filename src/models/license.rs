use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LicenseStatus {
    Unused,
    Used,
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct License {
    pub id: i64,
    pub license_key: String,
    pub status: LicenseStatus,
    /// Fingerprint of the machine this license is bound to.
    pub machine_code: Option<String>,
    pub duration_days: i64,
    pub expires_at: i64,
    pub last_used_at: Option<i64>,
    pub machine_note: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl License {
    pub fn is_expired(&self, now: i64) -> bool {
        now > self.expires_at
    }
}

/// Filters for the admin license listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LicenseFilter {
    pub status: Option<LicenseStatus>,
    /// Substring match on license key, machine code or note.
    pub search: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LicenseStats {
    pub total: i64,
    pub unused: i64,
    pub used: i64,
    pub disabled: i64,
    pub expired: i64,
    /// Not yet expired, but expiring within the next seven days.
    pub expiring_soon: i64,
}
