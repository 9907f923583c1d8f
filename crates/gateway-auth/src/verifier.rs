use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use tracing::debug;

use gateway_core::CallerContext;

use crate::claims::extract;
use crate::error::{AuthError, Result};
use crate::jwks::JwksCache;
use crate::types::RawClaims;

/// A fixed audience every deployment accepts in addition to its own client
/// id, used by integration-test runners that cannot be configured per
/// environment.
pub const INTEGRATION_RUNNER_AUDIENCE: &str = "gateway-integration-runner";

pub struct TokenVerifier {
    jwks: JwksCache,
    issuer: String,
    extra_issuers: Vec<String>,
    client_id: String,
    algorithm: Algorithm,
}

impl TokenVerifier {
    pub fn new(jwks: JwksCache, issuer: String, extra_issuers: Vec<String>, client_id: String) -> Self {
        Self {
            jwks,
            issuer,
            extra_issuers,
            client_id,
            algorithm: Algorithm::RS256,
        }
    }

    /// Override the default signing algorithm (RS256).
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub async fn verify(&self, token: &str) -> Result<CallerContext> {
        let header = decode_header(token).map_err(|_| AuthError::Malformed)?;
        let kid = header.kid.ok_or(AuthError::Malformed)?;

        let jwk = self.jwks.find(&kid).await?;
        let decoding_key =
            DecodingKey::from_jwk(&jwk).map_err(|e| AuthError::JwksFetch(e.to_string()))?;

        let mut validation = Validation::new(self.algorithm);
        // Audience and issuer get their own policy below; disable the
        // library's built-in checks so we control the accepted-value sets.
        validation.validate_aud = false;
        validation.set_issuer::<&str>(&[]);

        let data = decode::<RawClaims>(token, &decoding_key, &validation).map_err(|e| {
            use jsonwebtoken::errors::ErrorKind;
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                ErrorKind::InvalidSignature => AuthError::BadSignature,
                _ => AuthError::Malformed,
            }
        })?;
        let claims = data.claims;

        if !claims.aud.contains(&self.client_id) && !claims.aud.contains(INTEGRATION_RUNNER_AUDIENCE)
        {
            return Err(AuthError::AudienceMismatch);
        }

        if !self.accepted_issuers().iter().any(|i| issuer_eq(i, &claims.iss)) {
            return Err(AuthError::IssuerMismatch);
        }

        debug!(user_id = %claims.sub, "token verified");
        Ok(extract(&claims, &self.client_id))
    }

    fn accepted_issuers(&self) -> Vec<String> {
        let mut set = vec![self.issuer.clone()];
        set.extend(self.extra_issuers.iter().cloned());
        set
    }
}

/// Compare issuers allowing a default-port-stripped variant of either side
/// to match the other (split-horizon deployments behind a reverse proxy).
fn issuer_eq(configured: &str, presented: &str) -> bool {
    configured == presented || strip_default_port(configured) == strip_default_port(presented)
}

fn strip_default_port(issuer: &str) -> String {
    for suffix in [":443", ":80"] {
        if let Some(stripped) = issuer.strip_suffix(suffix) {
            return stripped.to_string();
        }
    }
    issuer.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_default_https_port() {
        assert_eq!(strip_default_port("https://idp.example.com:443"), "https://idp.example.com");
    }

    #[test]
    fn leaves_nonstandard_port_untouched() {
        assert_eq!(strip_default_port("https://idp.example.com:8443"), "https://idp.example.com:8443");
    }

    #[test]
    fn issuer_eq_matches_port_stripped_variant() {
        assert!(issuer_eq("https://idp.example.com:443", "https://idp.example.com"));
        assert!(issuer_eq("https://idp.example.com", "https://idp.example.com:443"));
        assert!(!issuer_eq("https://idp.example.com", "https://other.example.com"));
    }
}
