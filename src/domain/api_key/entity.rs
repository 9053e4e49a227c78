//! API key record and related types

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::validation::{validate_token, TokenValidationError};

/// Number of leading token characters shown in logs
const FINGERPRINT_LEN: usize = 8;

/// API token - the opaque string handed out to callers
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ApiToken(String);

impl ApiToken {
    /// Create a new ApiToken after validation
    pub fn new(token: impl Into<String>) -> Result<Self, TokenValidationError> {
        let token = token.into();
        validate_token(&token)?;
        Ok(Self(token))
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short, non-secret prefix of the token for log lines
    pub fn fingerprint(&self) -> &str {
        // Tokens are ASCII, so any byte index is a char boundary
        &self.0[..FINGERPRINT_LEN.min(self.0.len())]
    }
}

impl TryFrom<String> for ApiToken {
    type Error = TokenValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ApiToken> for String {
    fn from(token: ApiToken) -> Self {
        token.0
    }
}

impl std::fmt::Display for ApiToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ApiToken({}…)", self.fingerprint())
    }
}

/// Status of a key record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum KeyStatus {
    /// Key is in the pool and has not been handed out
    #[default]
    Unused,
    /// Key has been issued to a caller
    Used,
}

impl KeyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unused => "unused",
            Self::Used => "used",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unused" => Some(Self::Unused),
            "used" => Some(Self::Used),
            _ => None,
        }
    }
}

impl std::fmt::Display for KeyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted API key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    token: ApiToken,
    status: KeyStatus,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl KeyRecord {
    /// Create a new unused record expiring `window` after `created_at`.
    ///
    /// The expiration saturates at the latest representable instant.
    pub fn new(token: ApiToken, created_at: DateTime<Utc>, window: Duration) -> Self {
        let expires_at = created_at
            .checked_add_signed(window)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Self {
            token,
            status: KeyStatus::Unused,
            expires_at,
            created_at,
        }
    }

    /// Rebuild a record from its stored columns
    pub fn from_parts(
        token: ApiToken,
        status: KeyStatus,
        expires_at: DateTime<Utc>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            token,
            status,
            expires_at,
            created_at,
        }
    }

    pub fn token(&self) -> &ApiToken {
        &self.token
    }

    pub fn status(&self) -> KeyStatus {
        self.status
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// A key is expired once `now` is strictly past `expires_at`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Whether the record belongs to the issuable pool at `now`
    pub fn is_available_at(&self, now: DateTime<Utc>) -> bool {
        self.status == KeyStatus::Unused && !self.is_expired_at(now)
    }

    /// Flip Unused -> Used. Returns false if the key was already used.
    pub fn mark_used(&mut self) -> bool {
        if self.status == KeyStatus::Used {
            return false;
        }

        self.status = KeyStatus::Used;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(s: &str) -> ApiToken {
        ApiToken::new(s).unwrap()
    }

    #[test]
    fn test_api_token_valid() {
        let t = token("abc-DEF_123");
        assert_eq!(t.as_str(), "abc-DEF_123");
        assert_eq!(t.to_string(), "abc-DEF_123");
    }

    #[test]
    fn test_api_token_invalid() {
        assert!(ApiToken::new("").is_err());
        assert!(ApiToken::new("has space").is_err());
        assert!(ApiToken::new("padded==").is_err());
    }

    #[test]
    fn test_api_token_fingerprint() {
        assert_eq!(token("abcdefghijkl").fingerprint(), "abcdefgh");
        assert_eq!(token("abc").fingerprint(), "abc");
    }

    #[test]
    fn test_api_token_debug_hides_secret() {
        let debug = format!("{:?}", token("abcdefghSECRET"));
        assert!(!debug.contains("SECRET"));
    }

    #[test]
    fn test_key_status_round_trip() {
        assert_eq!(KeyStatus::parse("unused"), Some(KeyStatus::Unused));
        assert_eq!(KeyStatus::parse("used"), Some(KeyStatus::Used));
        assert_eq!(KeyStatus::parse("revoked"), None);
        assert_eq!(KeyStatus::Used.to_string(), "used");
    }

    #[test]
    fn test_new_record_expiration() {
        let now = Utc::now();
        let record = KeyRecord::new(token("abc"), now, Duration::days(30));

        assert_eq!(record.status(), KeyStatus::Unused);
        assert_eq!(record.expires_at(), now + Duration::days(30));
        assert_eq!(record.created_at(), now);
    }

    #[test]
    fn test_new_record_expiration_saturates() {
        let now = Utc::now();
        let record = KeyRecord::new(token("abc"), now, Duration::days(365 * 300_000));

        assert_eq!(record.expires_at(), DateTime::<Utc>::MAX_UTC);
        assert!(!record.is_expired_at(now));
    }

    #[test]
    fn test_expiration_boundary() {
        let now = Utc::now();
        let record = KeyRecord::new(token("abc"), now, Duration::seconds(10));

        assert!(!record.is_expired_at(now));
        assert!(!record.is_expired_at(record.expires_at()));
        assert!(record.is_expired_at(record.expires_at() + Duration::milliseconds(1)));
    }

    #[test]
    fn test_availability() {
        let now = Utc::now();
        let mut record = KeyRecord::new(token("abc"), now, Duration::seconds(10));

        assert!(record.is_available_at(now));
        assert!(!record.is_available_at(now + Duration::seconds(11)));

        record.mark_used();
        assert!(!record.is_available_at(now));
    }

    #[test]
    fn test_mark_used_only_once() {
        let mut record = KeyRecord::new(token("abc"), Utc::now(), Duration::days(1));

        assert!(record.mark_used());
        assert_eq!(record.status(), KeyStatus::Used);
        assert!(!record.mark_used());
        assert_eq!(record.status(), KeyStatus::Used);
    }

    #[test]
    fn test_record_serialization() {
        let record = KeyRecord::new(token("abc"), Utc::now(), Duration::days(1));
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["token"], "abc");
        assert_eq!(json["status"], "unused");
    }
}
