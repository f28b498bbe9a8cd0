//! licensegate - machine-bound license keys with an HTTP verification API
//!
//! The library holds the license engine, the request pipeline that guards
//! it (rate limiting, client authentication, payload encryption) and the
//! SQLite storage underneath.

pub mod audit;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod db;
pub mod engine;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod pagination;
pub mod pipeline;
pub mod rate_limit;
pub mod util;
