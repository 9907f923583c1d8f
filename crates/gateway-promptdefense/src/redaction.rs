use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// Fixed fragments that indicate a leaked system prompt, matched as
/// case-insensitive substrings.
const LEAK_FRAGMENTS: &[&str] = &[
    "only use data below",
    "never invent pii",
    "available data context:",
    "you are the ai query gateway",
    "policy rules:",
];

const INTERNAL_TAGS: &[&str] = &["query_", "user_query", "system_instructions", "data_block"];

#[derive(Debug, Clone, Serialize)]
pub struct RedactionCount {
    pub kind: &'static str,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RedactionResult {
    pub redacted_text: String,
    pub summary: Vec<RedactionCount>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputPolicyMode {
    /// Replace offending fragments in place.
    Redact,
    /// Fail the request instead of redacting.
    Strict,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPolicyViolation {
    pub reason: String,
}

/// Layer 5a + 5b: detect leaked system-prompt fragments and internal tag
/// names. In [`OutputPolicyMode::Redact`] each hit is replaced with
/// `[SYSTEM-REDACTED]`; in [`OutputPolicyMode::Strict`] the first hit fails
/// the whole call.
pub fn scan_leaks(text: &str, mode: OutputPolicyMode) -> Result<String, OutputPolicyViolation> {
    let lower = text.to_lowercase();
    let mut out = text.to_string();

    for fragment in LEAK_FRAGMENTS {
        if lower.contains(fragment) {
            match mode {
                OutputPolicyMode::Strict => {
                    return Err(OutputPolicyViolation {
                        reason: format!("system prompt leak detected: \"{fragment}\""),
                    })
                }
                OutputPolicyMode::Redact => {
                    out = replace_case_insensitive(&out, fragment, "[SYSTEM-REDACTED]");
                }
            }
        }
    }

    for tag in INTERNAL_TAGS {
        let open = format!("<{tag}");
        if lower.contains(&open) {
            match mode {
                OutputPolicyMode::Strict => {
                    return Err(OutputPolicyViolation {
                        reason: format!("internal tag leak detected: \"{tag}\""),
                    })
                }
                OutputPolicyMode::Redact => {
                    out = replace_case_insensitive(&out, &open, "[SYSTEM-REDACTED]");
                }
            }
        }
    }

    Ok(out)
}

fn replace_case_insensitive(haystack: &str, needle: &str, replacement: &str) -> String {
    let re = Regex::new(&regex::escape(needle))
        .map(|r| Regex::new(&format!("(?i){}", r.as_str())).unwrap())
        .expect("escaped literal is a valid regex");
    re.replace_all(haystack, replacement).to_string()
}

static BANK_ROUTING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{9}\b").unwrap());
static BANK_ACCOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{10,17}\b").unwrap());
static SSN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap());
static CREDIT_CARD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:\d[ -]?){13,16}\b").unwrap());
static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap()
});
static PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:\+?1[-.\s]?)?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}\b").unwrap());

/// Domains that never get redacted even when they match the email pattern
/// (the gateway's own notification addresses, for example).
const EMAIL_DOMAIN_ALLOWLIST: &[&str] = &["gateway.internal", "example.com"];

/// Layer 5c. Order matters: more specific patterns are applied first so a
/// routing number embedded in a longer account number isn't redacted twice
/// under two different labels.
pub fn redact_pii(text: &str) -> RedactionResult {
    let mut working = text.to_string();
    let mut summary = Vec::new();

    for (kind, pattern) in [
        ("bank-routing", &*BANK_ROUTING),
        ("bank-account", &*BANK_ACCOUNT),
        ("ssn", &*SSN),
        ("credit-card", &*CREDIT_CARD),
    ] {
        let count = count_and_redact(&mut working, pattern, kind);
        if count > 0 {
            summary.push(RedactionCount { kind, count });
        }
    }

    let email_count = redact_emails(&mut working);
    if email_count > 0 {
        summary.push(RedactionCount { kind: "email", count: email_count });
    }

    let phone_count = count_and_redact(&mut working, &PHONE, "phone");
    if phone_count > 0 {
        summary.push(RedactionCount { kind: "phone", count: phone_count });
    }

    RedactionResult {
        redacted_text: working,
        summary,
    }
}

fn count_and_redact(working: &mut String, pattern: &Regex, kind: &str) -> usize {
    let count = pattern.find_iter(working).count();
    if count > 0 {
        *working = pattern
            .replace_all(working, format!("[{}-REDACTED]", kind.to_uppercase()))
            .to_string();
    }
    count
}

fn redact_emails(working: &mut String) -> usize {
    let mut count = 0;
    let redacted = EMAIL.replace_all(working, |caps: &regex::Captures| {
        let matched = &caps[0];
        let domain = matched.rsplit('@').next().unwrap_or("");
        if EMAIL_DOMAIN_ALLOWLIST.iter().any(|d| domain.eq_ignore_ascii_case(d)) {
            matched.to_string()
        } else {
            count += 1;
            "[EMAIL-REDACTED]".to_string()
        }
    });
    *working = redacted.to_string();
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_ssn() {
        let result = redact_pii("my ssn is 123-45-6789 ok");
        assert!(result.redacted_text.contains("[SSN-REDACTED]"));
        assert!(!result.redacted_text.contains("123-45-6789"));
    }

    #[test]
    fn redacts_email_outside_allowlist() {
        let result = redact_pii("contact me at jane.doe@outside.com please");
        assert!(result.redacted_text.contains("[EMAIL-REDACTED]"));
    }

    #[test]
    fn keeps_allowlisted_domain_email() {
        let result = redact_pii("reply to noreply@gateway.internal");
        assert!(result.redacted_text.contains("noreply@gateway.internal"));
        assert!(!result.summary.iter().any(|s| s.kind == "email"));
    }

    #[test]
    fn leak_detection_redacts_in_non_strict_mode() {
        let out = scan_leaks("Remember: only use data below for answers", OutputPolicyMode::Redact)
            .unwrap();
        assert!(out.contains("[SYSTEM-REDACTED]"));
    }

    #[test]
    fn leak_detection_fails_in_strict_mode() {
        let out = scan_leaks("never invent pii in your answer", OutputPolicyMode::Strict);
        assert!(out.is_err());
    }

    #[test]
    fn internal_tag_detection_flags_query_tag() {
        let out = scan_leaks("leaked: <query_abc123> hello", OutputPolicyMode::Strict);
        assert!(out.is_err());
    }
}
