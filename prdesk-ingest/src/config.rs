//! Secret resolution for prdesk-ingest
//!
//! Secrets resolve once at startup with Database → ENV → TOML priority.

use prdesk_common::config::TomlConfig;
use prdesk_common::Result;
use sqlx::{Pool, Sqlite};
use tracing::{info, warn};

use crate::db::settings;

pub const WEBHOOK_SECRET_ENV: &str = "PRDESK_WEBHOOK_SECRET";
pub const LLM_API_KEY_ENV: &str = "PRDESK_LLM_API_KEY";

/// Resolve the webhook shared secret
///
/// **Priority:** Database → ENV → TOML. `None` leaves the webhook open.
pub async fn resolve_webhook_secret(
    db: &Pool<Sqlite>,
    toml_config: &TomlConfig,
) -> Result<Option<String>> {
    let db_value = settings::get_webhook_secret(db).await?;
    let resolved = resolve_tiers(
        "Webhook shared secret",
        db_value,
        std::env::var(WEBHOOK_SECRET_ENV).ok(),
        toml_config.webhook.shared_secret.clone(),
    );

    if resolved.is_none() {
        warn!("No webhook shared secret configured; inbound webhooks are unauthenticated");
    }
    Ok(resolved)
}

/// Resolve the LLM provider API key
///
/// **Priority:** Database → ENV → TOML
pub async fn resolve_llm_api_key(
    db: &Pool<Sqlite>,
    toml_config: &TomlConfig,
) -> Result<Option<String>> {
    let db_value = settings::get_llm_api_key(db).await?;
    Ok(resolve_tiers(
        "LLM API key",
        db_value,
        std::env::var(LLM_API_KEY_ENV).ok(),
        toml_config.llm.api_key.clone(),
    ))
}

fn resolve_tiers(
    name: &str,
    db_value: Option<String>,
    env_value: Option<String>,
    toml_value: Option<String>,
) -> Option<String> {
    let tiers = [
        ("database", db_value),
        ("environment", env_value),
        ("TOML", toml_value),
    ];

    let sources: Vec<&str> = tiers
        .iter()
        .filter(|(_, value)| value.as_deref().is_some_and(is_valid_key))
        .map(|(source, _)| *source)
        .collect();

    // Warn if multiple sources (potential misconfiguration)
    if sources.len() > 1 {
        warn!(
            "{} found in multiple sources: {}. Using {} (highest priority).",
            name,
            sources.join(", "),
            sources[0]
        );
    }

    let (source, value) = tiers
        .into_iter()
        .find(|(_, value)| value.as_deref().is_some_and(is_valid_key))?;
    info!("{} loaded from {}", name, source);
    value
}

/// Validate a secret (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use prdesk_common::db::init_memory_database;
    use serial_test::serial;

    #[test]
    fn test_is_valid_key() {
        assert!(is_valid_key("abc"));
        assert!(!is_valid_key(""));
        assert!(!is_valid_key("   \t"));
    }

    #[test]
    fn test_tier_priority() {
        let pick = |db: Option<&str>, env: Option<&str>, toml: Option<&str>| {
            resolve_tiers(
                "secret",
                db.map(str::to_string),
                env.map(str::to_string),
                toml.map(str::to_string),
            )
        };

        assert_eq!(pick(Some("db"), Some("env"), Some("toml")).as_deref(), Some("db"));
        assert_eq!(pick(None, Some("env"), Some("toml")).as_deref(), Some("env"));
        assert_eq!(pick(Some("  "), None, Some("toml")).as_deref(), Some("toml"));
        assert_eq!(pick(None, Some(""), None), None);
    }

    #[tokio::test]
    #[serial]
    async fn test_database_secret_wins_over_environment() {
        let pool = init_memory_database().await.unwrap();
        settings::set_webhook_secret(&pool, "from-db").await.unwrap();
        std::env::set_var(WEBHOOK_SECRET_ENV, "from-env");

        let mut config = TomlConfig::default();
        config.webhook.shared_secret = Some("from-toml".to_string());

        let secret = resolve_webhook_secret(&pool, &config).await.unwrap();
        std::env::remove_var(WEBHOOK_SECRET_ENV);

        assert_eq!(secret.as_deref(), Some("from-db"));
    }

    #[tokio::test]
    #[serial]
    async fn test_llm_key_falls_back_to_toml() {
        let pool = init_memory_database().await.unwrap();
        std::env::remove_var(LLM_API_KEY_ENV);

        let mut config = TomlConfig::default();
        assert_eq!(resolve_llm_api_key(&pool, &config).await.unwrap(), None);

        config.llm.api_key = Some("sk-toml".to_string());
        assert_eq!(
            resolve_llm_api_key(&pool, &config).await.unwrap().as_deref(),
            Some("sk-toml")
        );
    }
}
