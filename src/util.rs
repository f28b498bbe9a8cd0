use std::collections::HashMap;
use std::net::IpAddr;

use axum::extract::Query;
use axum::http::{HeaderMap, Uri};

/// First non-empty value among `names`, checked in order.
///
/// Used for headers that are accepted under an `X-` prefixed alias as well.
pub fn header_value<'a>(headers: &'a HeaderMap, names: &[&str]) -> Option<&'a str> {
    names.iter().find_map(|name| {
        headers
            .get(*name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    })
}

/// Extract a Bearer token from the Authorization header.
///
/// Returns the token string without the "Bearer " prefix, or None if
/// the header is missing, malformed, or empty after the prefix.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}

/// Client IP reported by a reverse proxy.
///
/// Tries the first hop of `x-forwarded-for`, then `x-real-ip`, then
/// `client-ip`. Values that are not IP addresses are skipped.
pub fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    ["x-forwarded-for", "x-real-ip", "client-ip"]
        .iter()
        .filter_map(|name| headers.get(*name).and_then(|v| v.to_str().ok()))
        .filter_map(|value| value.split(',').next())
        .map(str::trim)
        .find(|candidate| candidate.parse::<IpAddr>().is_ok())
        .map(String::from)
}

pub fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

/// Value of a single query-string parameter.
pub fn query_param(uri: &Uri, name: &str) -> Option<String> {
    Query::<HashMap<String, String>>::try_from_uri(uri)
        .ok()
        .and_then(|Query(mut params)| params.remove(name))
        .filter(|v| !v.is_empty())
}
