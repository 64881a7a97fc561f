//! Configuration Vault – reads/writes `~/.vigil/config.toml`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use vigil_runtime::{ValidationConfig, VerifierConfig};
use vigil_types::DenialMarkers;

/// Persisted access-point configuration stored in `~/.vigil/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the verification service.
    #[serde(default = "default_verifier_url")]
    pub verifier_url: String,

    /// Address this access point is registered under on the verifier. Left
    /// empty, the public address is looked up at startup.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub device_ip: String,

    /// Zone guarded by this access point.
    #[serde(default = "default_zone")]
    pub zone: String,

    /// Directory the frame grabber writes captures into.
    #[serde(default = "default_frames_dir")]
    pub frames_dir: String,

    /// Door whose indicator lamp mirrors the verdicts, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub door: Option<u8>,

    /// Path of the access journal database. Defaults to
    /// `~/.vigil/journal.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journal_path: Option<String>,

    /// Verifier round-trip limit. Expiry counts as a transport error.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    #[serde(default = "default_intrusion_threshold")]
    pub intrusion_threshold: u32,

    #[serde(default = "default_intrusion_window_secs")]
    pub intrusion_window_secs: u64,

    /// Denial reasons containing one of these count toward the intrusion
    /// streak.
    #[serde(default = "default_permission_markers")]
    pub permission_markers: Vec<String>,

    /// Lamp controller id → serial device node, e.g. `"1" = "/dev/ttyUSB0"`.
    /// Kept last: TOML tables must follow plain values.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub signal_ports: BTreeMap<String, String>,
}

fn default_verifier_url() -> String {
    "http://localhost:8000".to_string()
}
fn default_zone() -> String {
    "main".to_string()
}
fn default_frames_dir() -> String {
    vigil_home().join("frames").to_string_lossy().into_owned()
}
fn default_timeout_secs() -> u64 {
    8
}
fn default_tick_interval_ms() -> u64 {
    3_000
}
fn default_cooldown_secs() -> u64 {
    10
}
fn default_intrusion_threshold() -> u32 {
    3
}
fn default_intrusion_window_secs() -> u64 {
    7
}
fn default_permission_markers() -> Vec<String> {
    DenialMarkers::default().as_slice().to_vec()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            verifier_url: default_verifier_url(),
            device_ip: String::new(),
            zone: default_zone(),
            frames_dir: default_frames_dir(),
            door: None,
            journal_path: None,
            timeout_secs: default_timeout_secs(),
            tick_interval_ms: default_tick_interval_ms(),
            cooldown_secs: default_cooldown_secs(),
            intrusion_threshold: default_intrusion_threshold(),
            intrusion_window_secs: default_intrusion_window_secs(),
            permission_markers: default_permission_markers(),
            signal_ports: BTreeMap::new(),
        }
    }
}

impl Config {
    pub fn validation_config(&self) -> ValidationConfig {
        ValidationConfig {
            tick_interval: Duration::from_millis(self.tick_interval_ms),
            cooldown: Duration::from_secs(self.cooldown_secs),
            intrusion_threshold: self.intrusion_threshold,
            intrusion_window: Duration::from_secs(self.intrusion_window_secs),
            permission_markers: DenialMarkers::new(self.permission_markers.iter().cloned()),
        }
    }

    pub fn verifier_config(&self, device_ip: &str) -> VerifierConfig {
        VerifierConfig::new(
            self.verifier_url.clone(),
            device_ip,
            self.zone.clone(),
            Duration::from_secs(self.timeout_secs),
        )
    }

    pub fn journal_path(&self) -> PathBuf {
        self.journal_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| vigil_home().join("journal.db"))
    }
}

fn home_dir() -> String {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string())
}

fn vigil_home() -> PathBuf {
    PathBuf::from(home_dir()).join(".vigil")
}

/// Return the path to `~/.vigil/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(&home_dir())
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".vigil").join("config.toml")
}

/// Load the config from disk with environment overrides applied.
/// Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    let mut cfg = read_from(&config_path())?;
    if let Some(cfg) = cfg.as_mut() {
        apply_env_overrides(cfg);
    }
    Ok(cfg)
}

/// Parse the file at `path` as written, without environment overrides.
pub(crate) fn read_from(path: &PathBuf) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    toml::from_str(&raw)
        .map(Some)
        .map_err(|e| format!("Failed to parse config: {}", e))
}

/// Apply `VIGIL_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `VIGIL_VERIFIER_URL` | `verifier_url` |
/// | `VIGIL_DEVICE_IP` | `device_ip` |
/// | `VIGIL_ZONE` | `zone` |
/// | `VIGIL_FRAMES_DIR` | `frames_dir` |
/// | `VIGIL_DOOR` | `door` (ignored unless a valid door number) |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("VIGIL_VERIFIER_URL") {
        cfg.verifier_url = v;
    }
    if let Ok(v) = std::env::var("VIGIL_DEVICE_IP") {
        cfg.device_ip = v;
    }
    if let Ok(v) = std::env::var("VIGIL_ZONE") {
        cfg.zone = v;
    }
    if let Ok(v) = std::env::var("VIGIL_FRAMES_DIR") {
        cfg.frames_dir = v;
    }
    if let Ok(v) = std::env::var("VIGIL_DOOR")
        && let Ok(door) = v.trim().parse::<u8>()
    {
        cfg.door = Some(door);
    }
}

/// Save the config to disk, creating `~/.vigil/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &PathBuf) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    // Owner-only read/write (rw-------) on Unix.
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_dir() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        (dir, path)
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let (_dir, path) = with_dir();
        save_to(&Config::default(), &path).expect("save");

        let file_mode = std::fs::metadata(&path).expect("file metadata").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600, "config file must have 0o600 permissions");

        let dir_mode = std::fs::metadata(path.parent().unwrap())
            .expect("dir metadata")
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(dir_mode, 0o700, "config directory must have 0o700 permissions");
    }

    #[test]
    fn roundtrip_custom_config() {
        let (_dir, path) = with_dir();
        let mut cfg = Config::default();
        cfg.zone = "4".to_string();
        cfg.door = Some(4);
        cfg.signal_ports.insert("1".into(), "/dev/ttyUSB0".into());
        save_to(&cfg, &path).expect("save");

        let loaded = read_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.zone, "4");
        assert_eq!(loaded.door, Some(4));
        assert_eq!(loaded.signal_ports.get("1").map(String::as_str), Some("/dev/ttyUSB0"));
        assert_eq!(loaded.timeout_secs, 8);
    }

    #[test]
    fn sparse_file_falls_back_to_defaults() {
        let (_dir, path) = with_dir();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "zone = \"7\"\n").unwrap();

        let loaded = read_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.zone, "7");
        assert_eq!(loaded.tick_interval_ms, 3_000);
        assert_eq!(loaded.intrusion_threshold, 3);
        assert!(loaded.door.is_none());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let (_dir, path) = with_dir();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "timeout_secs = \"soon\"\n").unwrap();
        assert!(read_from(&path).is_err());
    }

    #[test]
    fn read_from_returns_none_when_missing() {
        let (_dir, path) = with_dir();
        assert!(read_from(&path).expect("no error").is_none());
    }

    #[test]
    fn config_path_points_to_vigil_dir() {
        let p = config_path_for_home("/home/guard");
        assert!(p.to_string_lossy().contains(".vigil"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn derived_runtime_configs_follow_fields() {
        let mut cfg = Config::default();
        cfg.tick_interval_ms = 500;
        cfg.permission_markers = vec!["Restricted".into()];
        let validation = cfg.validation_config();
        assert_eq!(validation.tick_interval, Duration::from_millis(500));
        assert!(validation.permission_markers.matches("zone restricted"));
        assert!(validation.validate().is_ok());

        let verifier = cfg.verifier_config("10.0.0.9");
        assert_eq!(verifier.device_ip, "10.0.0.9");
        assert_eq!(verifier.timeout, Duration::from_secs(8));
    }

    #[test]
    fn apply_env_overrides_changes_fields() {
        // All VIGIL_* variables are exercised in this one test so parallel
        // tests never observe them.
        // SAFETY: no other test reads these variables.
        unsafe {
            std::env::set_var("VIGIL_VERIFIER_URL", "http://verifier:8000");
            std::env::set_var("VIGIL_DEVICE_IP", "192.168.1.20");
            std::env::set_var("VIGIL_ZONE", "9");
            std::env::set_var("VIGIL_FRAMES_DIR", "/var/lib/vigil/frames");
            std::env::set_var("VIGIL_DOOR", "9");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.verifier_url, "http://verifier:8000");
        assert_eq!(cfg.device_ip, "192.168.1.20");
        assert_eq!(cfg.zone, "9");
        assert_eq!(cfg.frames_dir, "/var/lib/vigil/frames");
        assert_eq!(cfg.door, Some(9));

        unsafe { std::env::set_var("VIGIL_DOOR", "not-a-door") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert!(cfg.door.is_none());

        unsafe {
            for var in [
                "VIGIL_VERIFIER_URL",
                "VIGIL_DEVICE_IP",
                "VIGIL_ZONE",
                "VIGIL_FRAMES_DIR",
                "VIGIL_DOOR",
            ] {
                std::env::remove_var(var);
            }
        }
    }
}
