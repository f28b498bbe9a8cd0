//! Append-only audit sink for verification attempts and admin actions.

use crate::db::{DbPool, queries};
use crate::error::Result;
use crate::models::AdminAction;

/// Who triggered an operation, as recorded in the audit logs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Origin {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl Origin {
    pub fn new(ip_address: Option<String>, user_agent: Option<String>) -> Self {
        Self {
            ip_address,
            user_agent,
        }
    }

    /// Operations started from the command line or background tasks.
    pub fn system() -> Self {
        Self {
            ip_address: None,
            user_agent: Some("system".to_string()),
        }
    }
}

#[derive(Clone)]
pub struct AuditSink {
    pool: DbPool,
    enabled: bool,
}

impl AuditSink {
    pub fn new(pool: DbPool, enabled: bool) -> Self {
        Self { pool, enabled }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn record_usage(
        &self,
        license_key: &str,
        machine_code: &str,
        status: &str,
        origin: &Origin,
        now: i64,
    ) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let conn = self.pool.get()?;
        queries::create_usage_log(
            &conn,
            license_key,
            machine_code,
            status,
            origin.ip_address.as_deref(),
            origin.user_agent.as_deref(),
            now,
        )
    }

    pub fn record_admin(
        &self,
        action: AdminAction,
        detail: &str,
        origin: &Origin,
        now: i64,
    ) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let conn = self.pool.get()?;
        queries::create_admin_log(
            &conn,
            action,
            Some(detail),
            origin.ip_address.as_deref(),
            origin.user_agent.as_deref(),
            now,
        )
    }
}
