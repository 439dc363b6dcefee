use crate::{InventoryError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3_600);
pub const DEFAULT_CONCURRENCY: usize = 8;
pub const MAX_CONCURRENCY: usize = 32;
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_NODE_SELECTOR: &str = "nvidia.com/gpu.present=true";
pub const DEFAULT_OCI_PROFILE: &str = "DEFAULT";

const ENV_PREFIX: &str = "FLEET_INVENTORY_";

/// Where and how the inventory is fetched. Independent of the scope.
#[derive(Debug, Clone)]
pub struct InventoryConfig {
    pub cache_dir: PathBuf,
    pub cache_ttl: Duration,
    pub concurrency: usize,
    pub call_timeout: Duration,
    pub oci_bin: PathBuf,
    pub kubectl_bin: PathBuf,
    pub node_selector: String,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            cache_ttl: DEFAULT_CACHE_TTL,
            concurrency: DEFAULT_CONCURRENCY,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            oci_bin: PathBuf::from("oci"),
            kubectl_bin: PathBuf::from("kubectl"),
            node_selector: DEFAULT_NODE_SELECTOR.to_string(),
        }
    }
}

impl InventoryConfig {
    /// Defaults overridden by `FLEET_INVENTORY_*` variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |suffix: &str| lookup(&format!("{ENV_PREFIX}{suffix}"));
        let defaults = Self::default();
        Self {
            cache_dir: var("CACHE_DIR")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            cache_ttl: parse_secs(var("CACHE_TTL_SECS").as_deref()).unwrap_or(defaults.cache_ttl),
            concurrency: parse_concurrency(var("CONCURRENCY").as_deref(), defaults.concurrency),
            call_timeout: parse_secs(var("CALL_TIMEOUT_SECS").as_deref())
                .filter(|d| !d.is_zero())
                .unwrap_or(defaults.call_timeout),
            ..defaults
        }
    }
}

pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("fleet-inventory")
}

pub fn parse_concurrency(raw: Option<&str>, default_value: usize) -> usize {
    raw.map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default_value)
        .clamp(1, MAX_CONCURRENCY)
}

fn parse_secs(raw: Option<&str>) -> Option<Duration> {
    raw.map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Account scope every remote call runs against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub compartment_id: String,
    pub region: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenancy_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
}

impl Scope {
    pub fn new(compartment_id: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            compartment_id: compartment_id.into(),
            region: region.into(),
            tenancy_id: None,
            profile: None,
        }
    }

    /// Fails when a value every remote call needs is missing.
    pub fn validate(&self) -> Result<()> {
        if self.compartment_id.trim().is_empty() {
            return Err(InventoryError::Configuration(
                "compartment id is required (--compartment-id or OCI_COMPARTMENT_ID)".into(),
            ));
        }
        if self.region.trim().is_empty() {
            return Err(InventoryError::Configuration(
                "region is required (--region, OCI_REGION or the OCI config profile)".into(),
            ));
        }
        Ok(())
    }
}

/// Scope values given explicitly, before environment and OCI config fallbacks.
#[derive(Debug, Clone, Default)]
pub struct ScopeOverrides {
    pub compartment_id: Option<String>,
    pub region: Option<String>,
    pub tenancy_id: Option<String>,
    pub profile: Option<String>,
    pub oci_config_file: Option<PathBuf>,
}

impl ScopeOverrides {
    /// Resolves against the process environment and `~/.oci/config`.
    pub fn resolve(self) -> Result<Scope> {
        let config_path = self
            .oci_config_file
            .clone()
            .or_else(|| dirs::home_dir().map(|home| home.join(".oci").join("config")));
        let config_text = config_path.as_deref().and_then(read_oci_config);
        self.resolve_with(|name| std::env::var(name).ok(), config_text.as_deref())
    }

    pub fn resolve_with(
        self,
        env: impl Fn(&str) -> Option<String>,
        oci_config: Option<&str>,
    ) -> Result<Scope> {
        let pick = |explicit: Option<String>, var: &str| {
            explicit
                .or_else(|| env(var))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let profile = pick(self.profile, "OCI_CLI_PROFILE");
        let file_profile = oci_config.and_then(|text| {
            parse_oci_config(text, profile.as_deref().unwrap_or(DEFAULT_OCI_PROFILE))
        });

        let tenancy_id = pick(self.tenancy_id, "OCI_TENANCY_ID")
            .or_else(|| file_profile.as_ref().and_then(|p| p.tenancy.clone()));
        let region = pick(self.region, "OCI_REGION")
            .or_else(|| file_profile.as_ref().and_then(|p| p.region.clone()))
            .unwrap_or_default();
        let compartment_id = pick(self.compartment_id, "OCI_COMPARTMENT_ID")
            .or_else(|| tenancy_id.clone())
            .unwrap_or_default();

        let scope = Scope {
            compartment_id,
            region,
            tenancy_id,
            profile,
        };
        scope.validate()?;
        Ok(scope)
    }
}

fn read_oci_config(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(text) => Some(text),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
        Err(err) => {
            log::warn!("Cannot read OCI config {}: {err}", path.display());
            None
        }
    }
}

/// Values of one profile in an OCI CLI config file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OciProfile {
    pub region: Option<String>,
    pub tenancy: Option<String>,
}

/// Reads `region` and `tenancy` for `profile`. Named profiles inherit keys
/// from `[DEFAULT]`. Returns `None` when the profile section does not exist.
pub fn parse_oci_config(text: &str, profile: &str) -> Option<OciProfile> {
    let mut defaults = OciProfile::default();
    let mut selected = OciProfile::default();
    let mut found = false;
    let mut section = String::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            section = name.trim().to_string();
            if section == profile {
                found = true;
            }
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        let target = if section == profile {
            &mut selected
        } else if section == DEFAULT_OCI_PROFILE {
            &mut defaults
        } else {
            continue;
        };
        match key.trim() {
            "region" => target.region = Some(value.to_string()),
            "tenancy" => target.tenancy = Some(value.to_string()),
            _ => {}
        }
    }

    found.then(|| OciProfile {
        region: selected.region.or(defaults.region),
        tenancy: selected.tenancy.or(defaults.tenancy),
    })
}
