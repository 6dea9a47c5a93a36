//! System-wide settings stored in the `system_settings` table.

use super::SettingsResult;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use sqlx::SqlitePool;

const AUTO_UPDATE_KEY: &str = "autoUpdate";

/// Device-wide switches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemSettings {
    pub auto_update: bool,
}

/// SQLite-backed system settings
#[derive(Clone)]
pub struct SettingsStore {
    pool: SqlitePool,
}

impl SettingsStore {
    /// Create the store and insert defaults for missing keys
    pub async fn new(pool: SqlitePool) -> SettingsResult<Self> {
        sqlx::query("INSERT OR IGNORE INTO system_settings (key, value) VALUES (?, ?)")
            .bind(AUTO_UPDATE_KEY)
            .bind(serde_json::to_string(&false)?)
            .execute(&pool)
            .await?;
        Ok(Self { pool })
    }

    /// Current settings
    pub async fn get(&self) -> SettingsResult<SystemSettings> {
        let auto_update = self.get_json(AUTO_UPDATE_KEY).await?.unwrap_or(false);
        Ok(SystemSettings { auto_update })
    }

    /// Enable or disable automatic updates
    pub async fn set_auto_update(&self, enabled: bool) -> SettingsResult<()> {
        self.put_json(AUTO_UPDATE_KEY, &enabled).await?;
        log::info!("Auto-update {}", if enabled { "enabled" } else { "disabled" });
        Ok(())
    }

    /// Decode the JSON value stored under `key`
    ///
    /// # Returns
    ///
    /// * `SettingsResult<Option<T>>` - `None` when the key is absent
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> SettingsResult<Option<T>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM system_settings WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(value.map(|raw| serde_json::from_str(&raw)).transpose()?)
    }

    /// Store `value` as JSON under `key`, replacing any previous value
    pub async fn put_json<T>(&self, key: &str, value: &T) -> SettingsResult<()>
    where
        T: Serialize + ?Sized,
    {
        sqlx::query(
            r#"
            INSERT INTO system_settings (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(serde_json::to_string(value)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
