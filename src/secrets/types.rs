//! Value types shared by every secret store implementation.
//!
//! [`SecretString`] keeps credential material out of logs, debug output and
//! serialized payloads. [`SecretId`] is the opaque reference that may travel
//! across relation boundaries; it never encodes the content it points at.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::error::{Result, SecretsError};

/// A string whose contents are redacted everywhere except [`SecretString::expose_secret`].
///
/// Debug prints `SecretString([REDACTED])`, Display prints `[REDACTED]` and
/// serialization emits `"[REDACTED]"`. Deserialization accepts real values so
/// configuration files can carry them. The buffer is zeroed on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretString(String);

impl SecretString {
    /// Wrap a secret value.
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Borrow the underlying value. Never log the result.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }

    /// Length of the secret in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the secret is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for SecretString {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str("[REDACTED]")
    }
}

impl<'de> Deserialize<'de> for SecretString {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(SecretString)
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretString([REDACTED])")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl PartialEq for SecretString {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for SecretString {}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Opaque identifier of a stored secret.
///
/// Identifiers are random and carry no information about the secret's
/// content, so they are safe to publish in relation data.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretId(String);

impl SecretId {
    const PREFIX: &'static str = "secret:";

    /// Generate a fresh identifier.
    pub fn generate() -> Self {
        Self(format!("{}{}", Self::PREFIX, uuid::Uuid::new_v4().simple()))
    }

    /// Parse an identifier received from elsewhere (relation data, CLI).
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        match raw.strip_prefix(Self::PREFIX) {
            Some(token) if !token.is_empty() => Ok(Self(raw.to_string())),
            _ => Err(SecretsError::invalid_content(format!(
                "'{}' is not a secret identifier",
                raw
            ))),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SecretId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a secret is addressed on lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretLookup {
    Id(SecretId),
    Label(String),
}

impl SecretLookup {
    pub fn label(label: impl Into<String>) -> Self {
        Self::Label(label.into())
    }
}

impl fmt::Display for SecretLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretLookup::Id(id) => write!(f, "{}", id),
            SecretLookup::Label(label) => write!(f, "label:{}", label),
        }
    }
}

impl From<SecretId> for SecretLookup {
    fn from(id: SecretId) -> Self {
        Self::Id(id)
    }
}

impl From<&SecretId> for SecretLookup {
    fn from(id: &SecretId) -> Self {
        Self::Id(id.clone())
    }
}

/// Recurring rotation schedule attached to a secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RotatePolicy {
    #[default]
    Never,
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl RotatePolicy {
    /// Interval between rotations, `None` for [`RotatePolicy::Never`].
    pub fn interval(&self) -> Option<Duration> {
        match self {
            RotatePolicy::Never => None,
            RotatePolicy::Hourly => Some(Duration::hours(1)),
            RotatePolicy::Daily => Some(Duration::days(1)),
            RotatePolicy::Weekly => Some(Duration::weeks(1)),
            RotatePolicy::Monthly => Some(Duration::days(30)),
            RotatePolicy::Quarterly => Some(Duration::days(90)),
            RotatePolicy::Yearly => Some(Duration::days(365)),
        }
    }

    /// When the next rotation is due if the content changed at `from`.
    pub fn next_rotation(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.interval().map(|interval| from + interval)
    }
}

/// Key/value content of a secret.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecretContent(BTreeMap<String, SecretString>);

impl SecretContent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<SecretString>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<SecretString>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&SecretString> {
        self.0.get(key)
    }

    /// Fetch a field that must be present, naming `secret` in the error.
    pub fn require(&self, secret: &str, key: &str) -> Result<&SecretString> {
        self.0.get(key).ok_or_else(|| SecretsError::missing_field(secret, key))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Copy the content into plain strings.
    ///
    /// Only for handing credentials to their rightful recipient (action
    /// results, persisted store snapshots).
    pub fn expose(&self) -> BTreeMap<String, String> {
        self.0.iter().map(|(k, v)| (k.clone(), v.expose_secret().to_string())).collect()
    }

    /// Reject content the store cannot hold.
    pub fn validate(&self) -> Result<()> {
        if self.0.is_empty() {
            return Err(SecretsError::invalid_content("secret content cannot be empty"));
        }
        if let Some(key) = self.0.keys().find(|k| k.is_empty()) {
            return Err(SecretsError::invalid_content(format!("invalid key '{}'", key)));
        }
        Ok(())
    }
}

impl FromIterator<(String, String)> for SecretContent {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k, SecretString::new(v))).collect())
    }
}
