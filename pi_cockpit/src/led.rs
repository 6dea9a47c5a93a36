//! Onboard status LED control.
//!
//! Each LED exposes `<root>/<NAME>/trigger`, listing every trigger the kernel
//! offers with the active one in brackets: `none mmc0 [actpwr] heartbeat`.
//! Trigger files are read directly. Writing needs root, so it goes through
//! `sudo sh -c`, and a mode is only written after it passed the character
//! check and appeared in the device's own trigger list.
//!
//! The trigger active at startup is remembered per LED and restored when the
//! LED is disabled or the `default` mode is selected.

use crate::{
    settings::{SettingsError, SettingsStore, UpdateLock},
    shell::{ShellError, ShellRunner},
};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::PathBuf, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

/// Where the kernel exposes LED classes
pub const DEFAULT_LEDS_ROOT: &str = "/sys/class/leds";

/// Modes a client may select; `default` means the startup trigger
pub const SELECTABLE_MODES: &[&str] = &["none", "mmc0", "actpwr", "heartbeat", "default"];

/// Tried in order when the startup trigger is unknown or gone
const FALLBACK_ORDER: &[&str] = &["default-on", "mmc0", "actpwr", "heartbeat", "input", "none"];

const LED_CONFIG_KEY: &str = "ledConfig";
const MAX_MODE_LEN: usize = 32;
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Which onboard LED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LedKind {
    /// Power LED
    #[serde(rename = "PWR")]
    Pwr,
    /// Activity LED
    #[serde(rename = "ACT")]
    Act,
}

impl LedKind {
    pub const ALL: [LedKind; 2] = [LedKind::Pwr, LedKind::Act];

    pub fn as_str(&self) -> &'static str {
        match self {
            LedKind::Pwr => "PWR",
            LedKind::Act => "ACT",
        }
    }
}

/// Persisted LED configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedConfig {
    pub enabled: bool,
    pub mode: String,
    pub led_type: LedKind,
}

impl Default for LedConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: "actpwr".to_string(),
            led_type: LedKind::Pwr,
        }
    }
}

/// Partial change; absent fields keep their current value
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedConfigUpdate {
    pub enabled: Option<bool>,
    pub mode: Option<String>,
    pub led_type: Option<LedKind>,
}

/// Availability and live state of the configured LED
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedStatus {
    pub available: bool,
    pub config: LedConfig,
    pub current_trigger: Option<String>,
    pub available_triggers: Vec<String>,
}

/// LED control errors
#[derive(Debug, Error)]
pub enum LedError {
    #[error("LED control not available on this system")]
    Unavailable,

    #[error("No LED trigger modes reported by the system")]
    NoTriggers,

    /// Not one of [`SELECTABLE_MODES`], or not a plausible trigger name
    #[error("Invalid LED mode '{0}'")]
    InvalidMode(String),

    /// Well-formed but not offered by this device
    #[error("LED mode '{mode}' is not available. Available modes: {available}")]
    UnsupportedMode { mode: String, available: String },

    #[error("Unable to resolve a default LED mode for this device")]
    NoFallback,

    #[error("Failed to read LED trigger: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to set LED trigger: {0}")]
    Shell(#[from] ShellError),

    #[error(transparent)]
    Settings(#[from] SettingsError),
}

pub type LedResult<T> = Result<T, LedError>;

/// Parsed trigger file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerList {
    pub available: Vec<String>,
    pub current: Option<String>,
}

impl TriggerList {
    pub fn parse(content: &str) -> Self {
        let mut list = TriggerList::default();
        for word in content.split_whitespace() {
            let name = word.trim_matches(|c| c == '[' || c == ']');
            if name.is_empty() {
                continue;
            }
            if word.starts_with('[') && word.ends_with(']') {
                list.current = Some(name.to_string());
            }
            list.available.push(name.to_string());
        }
        list
    }

    fn offers(&self, mode: &str) -> bool {
        self.available.iter().any(|m| m == mode)
    }
}

/// Trigger names are short and shell-inert
fn is_valid_mode_name(mode: &str) -> bool {
    !mode.is_empty()
        && mode.len() <= MAX_MODE_LEN
        && mode
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

/// LED configuration service
pub struct LedService {
    shell: Arc<dyn ShellRunner>,
    settings: SettingsStore,
    root: PathBuf,
    config: RwLock<LedConfig>,
    startup_triggers: Mutex<HashMap<LedKind, String>>,
    update_lock: UpdateLock,
}

impl LedService {
    pub fn new(shell: Arc<dyn ShellRunner>, settings: SettingsStore) -> Self {
        Self::with_root(shell, settings, DEFAULT_LEDS_ROOT)
    }

    /// Service reading trigger files below `root` instead of sysfs
    pub fn with_root(
        shell: Arc<dyn ShellRunner>,
        settings: SettingsStore,
        root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            shell,
            settings,
            root: root.into(),
            config: RwLock::new(LedConfig::default()),
            startup_triggers: Mutex::new(HashMap::new()),
            update_lock: UpdateLock::new(),
        }
    }

    /// Load the stored config, remember startup triggers and apply the config
    ///
    /// A missing LED is not an error; the config is still loaded so the
    /// dashboard can show it. A failed apply is logged and the service keeps
    /// running.
    pub async fn init(&self) -> LedResult<LedConfig> {
        let mut config = match self.settings.get_json::<LedConfig>(LED_CONFIG_KEY).await {
            Ok(stored) => stored.unwrap_or_default(),
            Err(SettingsError::Json(e)) => {
                log::warn!("Invalid stored LED config, using defaults: {}", e);
                LedConfig::default()
            }
            Err(e) => return Err(e.into()),
        };

        for led in LedKind::ALL {
            self.remember_startup_trigger(led).await;
        }

        match self.read_triggers(config.led_type).await? {
            Some(triggers) => {
                log::info!(
                    "{} LED available, triggers: {}",
                    config.led_type.as_str(),
                    triggers.available.join(", ")
                );
                if !triggers.offers(&config.mode)
                    && let Some(fallback) = self.fallback_trigger(config.led_type, &triggers).await
                {
                    log::warn!(
                        "Stored LED mode '{}' is not available, falling back to '{}'",
                        config.mode,
                        fallback
                    );
                    config.mode = fallback;
                    self.settings.put_json(LED_CONFIG_KEY, &config).await?;
                }

                if config.enabled {
                    match self.apply(&config).await {
                        Ok(()) => log::info!("Applied stored LED mode '{}'", config.mode),
                        Err(e) => log::error!("Failed to apply stored LED config: {}", e),
                    }
                }
            }
            None => log::info!(
                "{} LED control not available on this system",
                config.led_type.as_str()
            ),
        }

        *self.config.write().await = config.clone();
        Ok(config)
    }

    pub async fn config(&self) -> LedConfig {
        self.config.read().await.clone()
    }

    pub async fn status(&self) -> LedResult<LedStatus> {
        let config = self.config().await;
        let triggers = self.read_triggers(config.led_type).await?;

        Ok(LedStatus {
            available: triggers.is_some(),
            current_trigger: triggers.as_ref().and_then(|t| t.current.clone()),
            available_triggers: triggers.map(|t| t.available).unwrap_or_default(),
            config,
        })
    }

    /// Merge `update` into the current config, apply it, then persist it
    ///
    /// Nothing is stored unless the trigger write succeeded.
    ///
    /// # Errors
    ///
    /// * `LedError::Settings(SettingsError::UpdateInProgress)` - Another change is being applied
    /// * `LedError::InvalidMode` - Mode is not selectable
    /// * `LedError::Unavailable` - The target LED does not exist
    pub async fn update(&self, update: LedConfigUpdate) -> LedResult<LedConfig> {
        if let Some(mode) = &update.mode
            && !SELECTABLE_MODES.contains(&mode.as_str())
        {
            return Err(LedError::InvalidMode(mode.clone()));
        }

        let _guard = self.update_lock.try_acquire()?;

        let current = self.config().await;
        let led_type = update.led_type.unwrap_or(current.led_type);
        let triggers = self
            .read_triggers(led_type)
            .await?
            .ok_or(LedError::Unavailable)?;

        let mode = update.mode.unwrap_or(current.mode);
        let mode = if mode == "default" {
            self.fallback_trigger(led_type, &triggers)
                .await
                .ok_or(LedError::NoFallback)?
        } else {
            mode
        };

        let next = LedConfig {
            enabled: update.enabled.unwrap_or(current.enabled),
            mode,
            led_type,
        };
        self.apply(&next).await?;

        self.settings.put_json(LED_CONFIG_KEY, &next).await?;
        *self.config.write().await = next.clone();
        log::info!(
            "LED config updated: {} {} (enabled: {})",
            next.led_type.as_str(),
            next.mode,
            next.enabled
        );
        Ok(next)
    }

    /// Write the trigger `config` calls for
    async fn apply(&self, config: &LedConfig) -> LedResult<()> {
        let led = config.led_type;
        let triggers = self.read_triggers(led).await?.ok_or(LedError::Unavailable)?;
        if triggers.available.is_empty() {
            return Err(LedError::NoTriggers);
        }

        let mode = if config.enabled && config.mode != "default" {
            config.mode.clone()
        } else {
            if !config.enabled {
                log::info!("Restoring default {} LED behaviour", led.as_str());
            }
            self.fallback_trigger(led, &triggers)
                .await
                .ok_or(LedError::NoFallback)?
        };
        self.write_trigger(led, &mode, &triggers).await
    }

    async fn write_trigger(
        &self,
        led: LedKind,
        mode: &str,
        triggers: &TriggerList,
    ) -> LedResult<()> {
        if !is_valid_mode_name(mode) {
            return Err(LedError::InvalidMode(mode.to_string()));
        }
        if !triggers.offers(mode) {
            return Err(LedError::UnsupportedMode {
                mode: mode.to_string(),
                available: triggers.available.join(", "),
            });
        }

        let script = format!("echo {} > '{}'", mode, self.trigger_path(led).display());
        self.shell
            .exec("sudo", &["sh", "-c", &script], WRITE_TIMEOUT)
            .await?;

        log::info!("Set {} LED trigger to {}", led.as_str(), mode);
        Ok(())
    }

    fn trigger_path(&self, led: LedKind) -> PathBuf {
        self.root.join(led.as_str()).join("trigger")
    }

    /// Trigger file contents, `None` when the LED does not exist
    async fn read_triggers(&self, led: LedKind) -> LedResult<Option<TriggerList>> {
        match tokio::fs::read_to_string(self.trigger_path(led)).await {
            Ok(content) => Ok(Some(TriggerList::parse(&content))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn remember_startup_trigger(&self, led: LedKind) {
        let mut startup = self.startup_triggers.lock().await;
        if startup.contains_key(&led) {
            return;
        }
        match self.read_triggers(led).await {
            Ok(Some(TriggerList {
                current: Some(current),
                ..
            })) => {
                log::debug!("{} LED startup trigger: {}", led.as_str(), current);
                startup.insert(led, current);
            }
            Ok(_) => {}
            Err(e) => log::warn!("Could not read {} LED trigger: {}", led.as_str(), e),
        }
    }

    /// Startup trigger if still offered, else the first offered preferred mode
    async fn fallback_trigger(&self, led: LedKind, triggers: &TriggerList) -> Option<String> {
        self.remember_startup_trigger(led).await;

        let startup = self.startup_triggers.lock().await;
        if let Some(recorded) = startup.get(&led)
            && triggers.offers(recorded)
        {
            return Some(recorded.clone());
        }

        FALLBACK_ORDER
            .iter()
            .find(|mode| triggers.offers(mode))
            .map(|mode| mode.to_string())
            .or_else(|| triggers.available.first().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db::Database, testing::ScriptedShell};
    use std::path::Path;
    use tempfile::TempDir;

    /// Shell that performs `echo MODE > 'PATH'` like the kernel would,
    /// moving the brackets to the written trigger
    fn sysfs_shell(delay: Duration) -> Arc<ScriptedShell> {
        ScriptedShell::slow(delay, |_, args| {
            let script = args[2];
            let (mode, path) = script
                .strip_prefix("echo ")
                .and_then(|rest| rest.split_once(" > "))
                .unwrap();
            let path = path.trim_matches('\'');
            let list = TriggerList::parse(&std::fs::read_to_string(path).unwrap());
            let rewritten: Vec<String> = list
                .available
                .iter()
                .map(|m| if m == mode { format!("[{}]", m) } else { m.clone() })
                .collect();
            std::fs::write(path, rewritten.join(" ")).unwrap();
            crate::testing::stdout("")
        })
    }

    fn write_led(root: &Path, led: LedKind, content: &str) {
        let dir = root.join(led.as_str());
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("trigger"), content).unwrap();
    }

    async fn service(root: &Path, shell: Arc<ScriptedShell>) -> (LedService, SettingsStore) {
        let db = Database::in_memory().await.unwrap();
        let settings = SettingsStore::new(db.pool().clone()).await.unwrap();
        (
            LedService::with_root(shell, settings.clone(), root),
            settings,
        )
    }

    #[test]
    fn test_parse_trigger_list() {
        let list = TriggerList::parse("none mmc0 [actpwr] heartbeat\n");
        assert_eq!(list.available, vec!["none", "mmc0", "actpwr", "heartbeat"]);
        assert_eq!(list.current.as_deref(), Some("actpwr"));

        let list = TriggerList::parse("none timer");
        assert_eq!(list.current, None);
        assert!(TriggerList::parse("  ").available.is_empty());
    }

    #[test]
    fn test_mode_name_check() {
        assert!(is_valid_mode_name("default-on"));
        assert!(is_valid_mode_name("mmc0"));
        assert!(!is_valid_mode_name(""));
        assert!(!is_valid_mode_name("none; reboot"));
        assert!(!is_valid_mode_name(&"a".repeat(MAX_MODE_LEN + 1)));
    }

    #[test]
    fn test_config_json_shape() {
        let json = serde_json::to_value(LedConfig::default()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"enabled": true, "mode": "actpwr", "ledType": "PWR"})
        );
        let update: LedConfigUpdate = serde_json::from_str(r#"{"ledType":"ACT"}"#).unwrap();
        assert_eq!(update.led_type, Some(LedKind::Act));
        assert!(serde_json::from_str::<LedConfigUpdate>(r#"{"ledType":"RGB"}"#).is_err());
    }

    #[tokio::test]
    async fn test_missing_led_reports_unavailable() {
        let dir = TempDir::new().unwrap();
        let shell = sysfs_shell(Duration::ZERO);
        let (service, _) = service(dir.path(), shell.clone()).await;

        assert_eq!(service.init().await.unwrap(), LedConfig::default());
        let status = service.status().await.unwrap();
        assert!(!status.available);
        assert!(status.available_triggers.is_empty());

        let err = service
            .update(LedConfigUpdate {
                mode: Some("heartbeat".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LedError::Unavailable));
        assert!(shell.calls().is_empty());
    }

    #[tokio::test]
    async fn test_update_writes_trigger_and_persists() {
        let dir = TempDir::new().unwrap();
        write_led(dir.path(), LedKind::Pwr, "none mmc0 [actpwr] heartbeat");
        let shell = sysfs_shell(Duration::ZERO);
        let (service, settings) = service(dir.path(), shell.clone()).await;
        service.init().await.unwrap();

        let config = service
            .update(LedConfigUpdate {
                mode: Some("heartbeat".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(config.mode, "heartbeat");

        let calls = shell.calls();
        let last = calls.last().unwrap();
        assert!(last.starts_with("sudo sh -c echo heartbeat > '"));
        assert!(last.ends_with("PWR/trigger'"));

        let status = service.status().await.unwrap();
        assert!(status.available);
        assert_eq!(status.current_trigger.as_deref(), Some("heartbeat"));
        assert_eq!(
            settings.get_json::<LedConfig>(LED_CONFIG_KEY).await.unwrap(),
            Some(config)
        );
    }

    #[tokio::test]
    async fn test_disable_and_default_restore_startup_trigger() {
        let dir = TempDir::new().unwrap();
        write_led(dir.path(), LedKind::Pwr, "none [mmc0] actpwr heartbeat");
        let (service, _) = service(dir.path(), sysfs_shell(Duration::ZERO)).await;
        service.init().await.unwrap();

        service
            .update(LedConfigUpdate {
                mode: Some("none".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(
            service.status().await.unwrap().current_trigger.as_deref(),
            Some("none")
        );

        let config = service
            .update(LedConfigUpdate {
                enabled: Some(false),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(!config.enabled);
        assert_eq!(
            service.status().await.unwrap().current_trigger.as_deref(),
            Some("mmc0")
        );

        let config = service
            .update(LedConfigUpdate {
                enabled: Some(true),
                mode: Some("default".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(config.mode, "mmc0");
    }

    #[tokio::test]
    async fn test_modes_outside_device_list_rejected() {
        let dir = TempDir::new().unwrap();
        write_led(dir.path(), LedKind::Act, "none [mmc0]");
        let shell = sysfs_shell(Duration::ZERO);
        let (service, settings) = service(dir.path(), shell.clone()).await;

        let err = service
            .update(LedConfigUpdate {
                mode: Some("heartbeat".into()),
                led_type: Some(LedKind::Act),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LedError::UnsupportedMode { .. }));

        let err = service
            .update(LedConfigUpdate {
                mode: Some("timer".into()),
                led_type: Some(LedKind::Act),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LedError::InvalidMode(_)));

        assert!(shell.calls().is_empty());
        assert_eq!(service.config().await, LedConfig::default());
        assert_eq!(
            settings.get_json::<LedConfig>(LED_CONFIG_KEY).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_concurrent_update_rejected() {
        let dir = TempDir::new().unwrap();
        write_led(dir.path(), LedKind::Pwr, "none mmc0 [actpwr] heartbeat");
        let (service, _) = service(dir.path(), sysfs_shell(Duration::from_millis(300))).await;
        let service = Arc::new(service);

        let first = {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .update(LedConfigUpdate {
                        mode: Some("heartbeat".into()),
                        ..Default::default()
                    })
                    .await
            })
        };

        for _ in 0..100 {
            if service.update_lock.is_busy() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(service.update_lock.is_busy());

        let second = service
            .update(LedConfigUpdate {
                mode: Some("none".into()),
                ..Default::default()
            })
            .await;
        assert!(matches!(
            second,
            Err(LedError::Settings(SettingsError::UpdateInProgress))
        ));

        assert_eq!(first.await.unwrap().unwrap().mode, "heartbeat");
        assert!(!service.update_lock.is_busy());
    }

    #[tokio::test]
    async fn test_init_falls_back_when_stored_mode_is_gone() {
        let dir = TempDir::new().unwrap();
        write_led(dir.path(), LedKind::Pwr, "none [default-on] heartbeat");
        let shell = sysfs_shell(Duration::ZERO);
        let (service, settings) = service(dir.path(), shell.clone()).await;
        settings
            .put_json(
                LED_CONFIG_KEY,
                &LedConfig {
                    enabled: true,
                    mode: "actpwr".into(),
                    led_type: LedKind::Pwr,
                },
            )
            .await
            .unwrap();

        let config = service.init().await.unwrap();
        assert_eq!(config.mode, "default-on");
        assert_eq!(
            settings
                .get_json::<LedConfig>(LED_CONFIG_KEY)
                .await
                .unwrap()
                .map(|c| c.mode),
            Some("default-on".to_string())
        );
        assert_eq!(shell.calls().len(), 1);
    }
}
