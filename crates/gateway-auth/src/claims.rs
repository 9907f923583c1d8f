use std::collections::HashSet;
use std::sync::LazyLock;

use gateway_core::CallerContext;
use regex::Regex;
use tracing::warn;

use crate::types::RawClaims;

static DEPARTMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/(.+)-Department$").expect("static regex is valid"));

/// Derive the [`CallerContext`] the rest of the gateway consumes from a
/// token's raw claims, per the userId/username/roles/department mapping.
pub fn extract(claims: &RawClaims, client_id: &str) -> CallerContext {
    if claims.preferred_username.is_none() {
        warn!(sub = %claims.sub, "token missing preferredUsername claim");
    }
    if claims.email.is_none() {
        warn!(sub = %claims.sub, "token missing email claim");
    }

    let username = claims
        .preferred_username
        .clone()
        .filter(|s| !s.is_empty())
        .or_else(|| claims.name.clone().filter(|s| !s.is_empty()))
        .or_else(|| claims.given_name.clone().filter(|s| !s.is_empty()))
        .unwrap_or_else(|| format!("user-{}", first8(&claims.sub)))
        .to_string();
    let username = if username.is_empty() {
        "unknown".to_string()
    } else {
        username
    };

    let mut roles: HashSet<String> = claims
        .realm_access
        .as_ref()
        .map(|r| r.roles.clone())
        .unwrap_or_default()
        .into_iter()
        .collect();

    if let Some(entry) = claims.resource_access.get(client_id) {
        roles.extend(entry.roles.iter().cloned());
    }

    let department_code = claims
        .groups
        .iter()
        .find_map(|g| DEPARTMENT_RE.captures(g).map(|c| c[1].to_string()));

    CallerContext {
        user_id: claims.sub.clone(),
        username,
        email: claims.email.clone().unwrap_or_default(),
        roles,
        groups: claims.groups.clone(),
        department_code,
        token_id: claims.jti.clone(),
    }
}

fn first8(sub: &str) -> String {
    sub.chars().take(8).collect()
}
