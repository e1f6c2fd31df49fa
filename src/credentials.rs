//! Credential types and generators.
//!
//! Randomness comes from the operating system CSPRNG. Usernames carry 80 bits
//! and passwords 256 bits, both URL-safe base64 without padding.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::Serialize;

use crate::secrets::{self, SecretContent, SecretLookup, SecretStore, SecretString};

/// Label of the admin password secret.
pub const ADMIN_SECRET_LABEL: &str = "influxdb-admin-password";

const USERNAME_BYTES: usize = 10;
const PASSWORD_BYTES: usize = 32;

/// A username/password pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<SecretString>) -> Self {
        Self { username: username.into(), password: password.into() }
    }
}

/// Everything a consumer needs to connect to its provisioned database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialBundle {
    pub username: String,
    pub password: SecretString,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub policy: String,
}

impl CredentialBundle {
    pub fn to_secret_content(&self) -> SecretContent {
        SecretContent::new()
            .with("username", self.username.as_str())
            .with("password", self.password.clone())
            .with("host", self.host.as_str())
            .with("port", self.port.to_string())
            .with("database", self.database.as_str())
            .with("policy", self.policy.as_str())
    }

    /// Rebuild a bundle from secret content written by [`CredentialBundle::to_secret_content`].
    pub fn from_secret_content(secret: &str, content: &SecretContent) -> secrets::Result<Self> {
        let field = |key: &str| content.require(secret, key).map(|v| v.expose_secret().to_string());
        let port = field("port")?.parse::<u16>().map_err(|e| {
            secrets::SecretsError::invalid_content(format!("port in '{}' is invalid: {}", secret, e))
        })?;
        Ok(Self {
            username: field("username")?,
            password: content.require(secret, "password")?.clone(),
            host: field("host")?,
            port,
            database: field("database")?,
            policy: field("policy")?,
        })
    }
}

fn random_token(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    OsRng.fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(&buf)
}

/// Random database name (hyphenated UUID v4).
pub fn generate_database_name() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub fn generate_username() -> String {
    random_token(USERNAME_BYTES)
}

pub fn generate_password() -> SecretString {
    SecretString::new(random_token(PASSWORD_BYTES))
}

/// Current admin credentials, always read from the authoritative store.
pub async fn admin_credentials(
    store: &dyn SecretStore,
    username: &str,
) -> secrets::Result<Credentials> {
    let content = store.get(&SecretLookup::label(ADMIN_SECRET_LABEL), true).await?;
    let password = content.require(ADMIN_SECRET_LABEL, "password")?.clone();
    Ok(Credentials { username: username.to_string(), password })
}

/// Label of the secret holding a user created through the `create-user` action.
pub fn user_secret_label(username: &str) -> String {
    format!("influxdb-user-{}", username)
}

/// Label of the secret shared with `remote_app` over the provider relation.
pub fn relation_secret_label(remote_app: &str) -> String {
    format!("{}-influxdb-credentials", remote_app)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::{InMemorySecretStore, RotatePolicy};
    use std::collections::HashSet;

    #[test]
    fn test_generator_shapes() {
        let username = generate_username();
        // 10 bytes -> 14 unpadded base64 characters
        assert_eq!(username.len(), 14);
        assert!(username.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));

        // 32 bytes -> 43 unpadded base64 characters
        assert_eq!(generate_password().len(), 43);

        let db = generate_database_name();
        assert!(uuid::Uuid::parse_str(&db).is_ok());
    }

    #[test]
    fn test_generated_values_are_unique() {
        let names: HashSet<_> = (0..200).map(|_| generate_database_name()).collect();
        let users: HashSet<_> = (0..200).map(|_| generate_username()).collect();
        assert_eq!(names.len(), 200);
        assert_eq!(users.len(), 200);
    }

    #[test]
    fn test_bundle_secret_content_round_trip() {
        let bundle = CredentialBundle {
            username: "u".into(),
            password: SecretString::new("p"),
            host: "10.0.0.1".into(),
            port: 8086,
            database: "db".into(),
            policy: "default".into(),
        };
        let content = bundle.to_secret_content();
        let keys: Vec<_> = content.keys().collect();
        assert_eq!(keys, vec!["database", "host", "password", "policy", "port", "username"]);

        let back = CredentialBundle::from_secret_content("s", &content).unwrap();
        assert_eq!(back, bundle);
    }

    #[test]
    fn test_bundle_serialization_redacts_password() {
        let bundle = CredentialBundle {
            username: "u".into(),
            password: SecretString::new("hunter2"),
            host: "h".into(),
            port: 8086,
            database: "db".into(),
            policy: "default".into(),
        };
        let json = serde_json::to_string(&bundle).unwrap();
        assert!(!json.contains("hunter2"));
    }

    #[tokio::test]
    async fn test_admin_credentials_reads_label() {
        let store = InMemorySecretStore::new();
        assert!(admin_credentials(&store, "admin").await.is_err());

        store
            .create(SecretContent::new().with("password", "pw"), ADMIN_SECRET_LABEL, RotatePolicy::Daily)
            .await
            .unwrap();
        let creds = admin_credentials(&store, "admin").await.unwrap();
        assert_eq!(creds.username, "admin");
        assert_eq!(creds.password.expose_secret(), "pw");
    }

    #[test]
    fn test_labels() {
        assert_eq!(user_secret_label("bob"), "influxdb-user-bob");
        assert_eq!(relation_secret_label("grafana"), "grafana-influxdb-credentials");
    }
}
