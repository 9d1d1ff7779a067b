use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context};
use url::Url;

pub const CONFIG_FILE: &str = "portal.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub backend_url: String,
    pub credentials_path: PathBuf,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend_url: "http://127.0.0.1:4000".into(),
            credentials_path: PathBuf::from("./data/credentials.json"),
            log_filter: "info".into(),
        }
    }
}

/// Command-line values that win over the file and the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub backend_url: Option<String>,
    pub credentials_path: Option<PathBuf>,
    pub log_filter: Option<String>,
}

pub fn load_settings(overrides: &Overrides) -> anyhow::Result<Settings> {
    let mut settings = read_settings(Path::new(CONFIG_FILE), |key| std::env::var(key).ok());

    if let Some(v) = &overrides.backend_url {
        settings.backend_url = v.clone();
    }
    if let Some(v) = &overrides.credentials_path {
        settings.credentials_path = v.clone();
    }
    if let Some(v) = &overrides.log_filter {
        settings.log_filter = v.clone();
    }

    settings.backend_url = normalize_backend_url(&settings.backend_url)?;
    Ok(settings)
}

fn read_settings(path: &Path, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(&raw) {
            if let Some(v) = file_cfg.get("backend_url") {
                settings.backend_url = v.clone();
            }
            if let Some(v) = file_cfg.get("credentials_path") {
                settings.credentials_path = PathBuf::from(v);
            }
            if let Some(v) = file_cfg.get("log_filter") {
                settings.log_filter = v.clone();
            }
        }
    }

    if let Some(v) = env("PORTAL_BACKEND_URL") {
        settings.backend_url = v;
    }
    if let Some(v) = env("APP__BACKEND_URL") {
        settings.backend_url = v;
    }

    if let Some(v) = env("PORTAL_CREDENTIALS_PATH") {
        settings.credentials_path = PathBuf::from(v);
    }

    if let Some(v) = env("PORTAL_LOG") {
        settings.log_filter = v;
    }

    settings
}

pub fn normalize_backend_url(raw_backend_url: &str) -> anyhow::Result<String> {
    let trimmed = raw_backend_url.trim();

    if trimmed.is_empty() {
        return Ok(Settings::default().backend_url);
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };

    let parsed = Url::parse(&candidate)
        .with_context(|| format!("invalid backend url '{raw_backend_url}'"))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        bail!(
            "backend url '{raw_backend_url}' must use http or https, not '{}'",
            parsed.scheme()
        );
    }
    if parsed.host_str().is_none() {
        bail!("backend url '{raw_backend_url}' has no host");
    }

    Ok(candidate.trim_end_matches('/').to_string())
}
