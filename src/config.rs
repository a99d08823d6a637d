use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use homedir::my_home;
use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "config.yaml";

const DEFAULT_SEARCH_ENDPOINT: &str = "https://api.scraperapi.com/structured/amazon/search/v1";
const DEFAULT_SEARCH_TLD: &str = "com";
const DEFAULT_SEARCH_TIMEOUT_SECS: u64 = 35;
const DEFAULT_IMAGE_TIMEOUT_SECS: u64 = 20;
const DEFAULT_LISTEN: &str = "0.0.0.0:8080";

/// Catalog searches issued for every scan, one task per keyword and page.
const DEFAULT_KEYWORDS: [&str; 10] = [
    "comfrt hoodie",
    "comfrt sweatshirt",
    "comfrt sweatpants",
    "comfrt joggers",
    "comfrt pants",
    "airplane mode hoodie",
    "hoodie",
    "sweatshirt",
    "sweatpants",
    "joggers",
];

/// Best sellers of the real product line.
const DEFAULT_REFERENCE_IMAGES: [&str; 4] = [
    "https://comfrt.com/fast-image/c_limit,w_1200,fl_progressive:steep/comfrt/files/1_81.jpg?v=1764113204",
    "https://comfrt.com/fast-image/c_limit,w_1200,fl_progressive:steep/comfrt/files/3_1ce6eea1-f976-43bc-8ee2-65a0be725df6.jpg?v=1754947738",
    "https://comfrt.com/fast-image/comfrt/files/4_039ca4f1-1650-4681-8790-68d40298f48c.jpg?v=1767136765",
    "https://comfrt.com/fast-image/comfrt/files/1_4ab93fe8-5e1b-405c-b872-5ff73ef75076.jpg?v=1741350002",
];

/// Search provider settings. The API key comes from `SCRAPER_API_KEY`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,

    /// Marketplace top-level domain, e.g. "com" or "co.uk"
    #[serde(default = "default_search_tld")]
    pub tld: String,

    #[serde(default = "default_search_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: default_search_endpoint(),
            tld: default_search_tld(),
            timeout_secs: default_search_timeout_secs(),
        }
    }
}

fn default_search_endpoint() -> String {
    DEFAULT_SEARCH_ENDPOINT.to_string()
}

fn default_search_tld() -> String {
    DEFAULT_SEARCH_TLD.to_string()
}

fn default_search_timeout_secs() -> u64 {
    DEFAULT_SEARCH_TIMEOUT_SECS
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,

    #[serde(default = "default_reference_images")]
    pub reference_images: Vec<String>,

    #[serde(default)]
    pub search: SearchConfig,

    /// Deadline for fetching one image, reference or listing
    #[serde(default = "default_image_timeout_secs")]
    pub image_timeout_secs: u64,

    /// Daemon bind address
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            keywords: default_keywords(),
            reference_images: default_reference_images(),
            search: SearchConfig::default(),
            image_timeout_secs: default_image_timeout_secs(),
            listen: default_listen(),
            base_path: PathBuf::new(),
        }
    }
}

fn default_keywords() -> Vec<String> {
    DEFAULT_KEYWORDS.iter().map(|s| s.to_string()).collect()
}

fn default_reference_images() -> Vec<String> {
    DEFAULT_REFERENCE_IMAGES.iter().map(|s| s.to_string()).collect()
}

fn default_image_timeout_secs() -> u64 {
    DEFAULT_IMAGE_TIMEOUT_SECS
}

fn default_listen() -> String {
    DEFAULT_LISTEN.to_string()
}

impl Config {
    fn validate(&self) -> anyhow::Result<()> {
        if self.keywords.iter().all(|k| k.trim().is_empty()) {
            bail!("keywords must contain at least one search phrase");
        }

        if self.reference_images.is_empty() {
            bail!("reference_images must contain at least one url");
        }

        if self.search.timeout_secs == 0 {
            bail!("search.timeout_secs must be greater than 0");
        }

        if self.image_timeout_secs == 0 {
            bail!("image_timeout_secs must be greater than 0");
        }

        Ok(())
    }

    /// `LOOKALIKE_BASE_PATH`, or `~/.local/share/lookalike`.
    pub fn base_path() -> anyhow::Result<PathBuf> {
        if let Ok(path) = std::env::var("LOOKALIKE_BASE_PATH") {
            return Ok(PathBuf::from(path));
        }

        let home = my_home()
            .context("could not determine home directory")?
            .context("home directory path is empty")?;
        Ok(home.join(".local/share/lookalike"))
    }

    pub fn load() -> anyhow::Result<Self> {
        Self::load_with(&Self::base_path()?)
    }

    pub fn load_with(base_path: &Path) -> anyhow::Result<Self> {
        let path = base_path.join(CONFIG_FILE);

        // create new if does not exist
        if !path.exists() {
            std::fs::create_dir_all(base_path)
                .with_context(|| format!("failed to create {}", base_path.display()))?;
            std::fs::write(&path, serde_yml::to_string(&Self::default())?)
                .with_context(|| format!("failed to write {}", path.display()))?;
        }

        let config_str = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let mut config: Self = serde_yml::from_str(&config_str).context("config is malformed")?;

        config.base_path = base_path.to_path_buf();
        config.validate()?;

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let path = self.base_path.join(CONFIG_FILE);
        std::fs::write(&path, serde_yml::to_string(&self)?)
            .with_context(|| format!("failed to write {}", path.display()))
    }
}

/// Lenient numeric parse for query-string values: blank or garbage is `None`.
pub fn parse_number(value: Option<&str>) -> Option<f64> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse::<f64>().ok())
}

/// Truncate toward zero and clamp, falling back when missing or not finite.
pub fn clamp_int(value: Option<f64>, min: i64, max: i64, fallback: i64) -> i64 {
    match value {
        Some(n) if n.is_finite() => (n.trunc() as i64).clamp(min, max),
        _ => fallback,
    }
}

pub fn clamp_float(value: Option<f64>, min: f64, max: f64, fallback: f64) -> f64 {
    match value {
        Some(n) if n.is_finite() => n.clamp(min, max),
        _ => fallback,
    }
}
