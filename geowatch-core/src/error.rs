use thiserror::Error;

/// Failure taxonomy shared by every GeoWatch crate.
///
/// Adapters never let these cross their boundary for per-query failures —
/// they fold them into an unsuccessful outcome instead. Everything else
/// propagates with `?`.
#[derive(Debug, Error)]
pub enum GeoError {
    /// Retryable with backoff: HTTP 5xx, timeout, DNS, connection reset.
    #[error("transient network failure: {0}")]
    TransientNetwork(String),

    /// The engine told us to slow down; unusable for the rest of the task.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The page is alive but an anti-bot wall could not be resolved.
    #[error("challenge unresolved: {0}")]
    ChallengeUnresolved(String),

    /// Fatal for the current (engine, account) until a credential is enrolled.
    #[error("login required for engine '{engine}'")]
    LoginRequired { engine: String },

    /// Selectors and fallbacks produced neither text nor citations.
    #[error("engine protocol changed: {0}")]
    EngineProtocolChanged(String),

    /// Caller-provided arguments violate a contract. No state change.
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Stored bytes failed to decode or decrypt; raw bytes are never echoed.
    #[error("corrupt data: {0}")]
    Corrupt(String),

    #[error("browser error: {0}")]
    Browser(String),

    #[error("session error: {0}")]
    Session(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// Invariant violation. The worker crashes rather than corrupt state.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GeoError {
    /// Short machine-friendly kind tag, used in logs and persisted failure rows.
    pub fn kind(&self) -> &'static str {
        match self {
            GeoError::TransientNetwork(_) => "transient_network",
            GeoError::RateLimited(_) => "rate_limited",
            GeoError::ChallengeUnresolved(_) => "challenge_unresolved",
            GeoError::LoginRequired { .. } => "login_required",
            GeoError::EngineProtocolChanged(_) => "engine_protocol_changed",
            GeoError::BadRequest(_) => "bad_request",
            GeoError::NotFound(_) => "not_found",
            GeoError::Corrupt(_) => "corrupt",
            GeoError::Browser(_) => "browser",
            GeoError::Session(_) => "session",
            GeoError::Config(_) => "config",
            GeoError::Internal(_) => "internal",
        }
    }
}

impl From<std::io::Error> for GeoError {
    fn from(err: std::io::Error) -> Self {
        GeoError::Session(err.to_string())
    }
}

impl From<serde_json::Error> for GeoError {
    fn from(err: serde_json::Error) -> Self {
        GeoError::Corrupt(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GeoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_tags_are_stable() {
        assert_eq!(GeoError::BadRequest("x".into()).kind(), "bad_request");
        assert_eq!(
            GeoError::LoginRequired { engine: "kimi".into() }.kind(),
            "login_required"
        );
    }

    #[test]
    fn display_includes_context() {
        let err = GeoError::ChallengeUnresolved("cloudflare_captcha".into());
        assert!(err.to_string().contains("cloudflare_captcha"));
    }
}
