use std::collections::HashSet;

use gateway_core::ToolServer;

/// Tool servers a caller with `roles` may reach, in configuration
/// declaration order (deterministic prompt assembly depends on this).
pub fn accessible<'a>(servers: &'a [ToolServer], roles: &HashSet<String>) -> Vec<&'a ToolServer> {
    servers
        .iter()
        .filter(|s| s.required_roles.intersection(roles).next().is_some())
        .collect()
}

/// The complement of [`accessible`], same ordering guarantee.
pub fn denied<'a>(servers: &'a [ToolServer], roles: &HashSet<String>) -> Vec<&'a ToolServer> {
    servers
        .iter()
        .filter(|s| s.required_roles.intersection(roles).next().is_none())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(name: &str, roles: &[&str]) -> ToolServer {
        ToolServer {
            name: name.to_string(),
            endpoint: format!("http://{name}.internal"),
            required_roles: roles.iter().map(|r| r.to_string()).collect(),
            description: String::new(),
        }
    }

    #[test]
    fn accessible_keeps_declaration_order() {
        let servers = vec![
            server("billing", &["finance"]),
            server("hr", &["hr-admin"]),
            server("reports", &["finance", "exec"]),
        ];
        let roles: HashSet<String> = ["finance".to_string()].into_iter().collect();
        let got: Vec<&str> = accessible(&servers, &roles).into_iter().map(|s| s.name.as_str()).collect();
        assert_eq!(got, vec!["billing", "reports"]);
    }

    #[test]
    fn accessible_and_denied_partition_the_full_list() {
        let servers = vec![server("billing", &["finance"]), server("hr", &["hr-admin"])];
        let roles: HashSet<String> = ["finance".to_string()].into_iter().collect();
        assert_eq!(accessible(&servers, &roles).len() + denied(&servers, &roles).len(), servers.len());
    }

    #[test]
    fn caller_with_no_matching_roles_gets_empty_accessible() {
        let servers = vec![server("billing", &["finance"])];
        let roles: HashSet<String> = ["sales".to_string()].into_iter().collect();
        assert!(accessible(&servers, &roles).is_empty());
        assert_eq!(denied(&servers, &roles).len(), 1);
    }
}
