use serde::{Deserialize, Serialize};

/// One verification attempt, successful or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageLog {
    pub id: i64,
    pub license_key: String,
    pub machine_code: String,
    /// Outcome text (`bound`, `verified`, `not_found`, ...).
    pub status: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UsageLogQuery {
    pub license_key: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
