pub mod delimiters;
pub mod keywords;
pub mod redaction;
pub mod validation;

pub use delimiters::{DelimiterCache, DelimiterPair};
pub use redaction::{redact_pii, scan_leaks, OutputPolicyMode, OutputPolicyViolation, RedactionResult};
pub use validation::{validate, ValidationFailure};

/// A Layers-1/2 rejection, carrying the layer name the orchestrator needs
/// for `GatewayError::PromptRejected { layer, reason }`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptRejection {
    pub layer: &'static str,
    pub reason: String,
}

/// Runs Layer 1 then Layer 2 over a raw query. Stops at the first failure —
/// there is no reason to spend a regex-set scan on input that already failed
/// structural validation.
pub fn sanitise_input(input: &str) -> Result<(), PromptRejection> {
    validation::validate(input).map_err(|f| PromptRejection {
        layer: "input_validation",
        reason: f.reason(),
    })?;

    if keywords::is_blocked(input) {
        return Err(PromptRejection {
            layer: "keyword_blocking",
            reason: "input matched a blocked phrase pattern".to_string(),
        });
    }

    Ok(())
}
