mod admin_log;
mod license;
mod usage_log;

pub use admin_log::*;
pub use license::*;
pub use usage_log::*;
