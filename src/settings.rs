use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use config::{Config, Environment};
use serde::{Deserialize, Serialize};

const ENV_PREFIX: &str = "SURFACE";
const DEFAULT_KEY_FILE: &str = "/etc/secrets/ga_keys.json";
const DEFAULT_SCOPE: &str = "https://www.googleapis.com/auth/analytics.readonly";
const DEFAULT_ENDPOINT: &str = "https://analyticsreporting.googleapis.com";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub analytics: AnalyticsSettings,
    #[serde(default)]
    pub auth: AuthSettings,
    #[serde(default = "default_views")]
    pub views: Vec<SelectOption>,
    #[serde(default = "default_windows")]
    pub windows: Vec<SelectOption>,
    pub default_view: String,
    pub default_window: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyticsSettings {
    pub key_file: PathBuf,
    pub scopes: Vec<String>,
    pub endpoint: String,
    pub page_size: u32,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthSettings {
    pub username: Option<String>,
    pub password: Option<String>,
}

/// One entry of a dashboard dropdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

impl SelectOption {
    fn new(value: &str, label: &str) -> Self {
        Self {
            value: value.to_string(),
            label: label.to_string(),
        }
    }
}

fn default_views() -> Vec<SelectOption> {
    vec![
        SelectOption::new("252616533", "Low Stock Counter"),
        SelectOption::new("277875383", "Product Page Banner"),
    ]
}

fn default_windows() -> Vec<SelectOption> {
    vec![
        SelectOption::new("7daysAgo", "Last 7 days"),
        SelectOption::new("30daysAgo", "Last 30 days"),
    ]
}

impl Settings {
    /// Load from the process environment (after `.env`, if any).
    pub fn load() -> Result<Self> {
        Self::from_vars(std::env::vars().collect())
    }

    /// Defaults, overridden by `SURFACE_*` variables; the dashboard login
    /// comes from `USER_NAME` / `PASSWORD`.
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self> {
        let username = vars.get("USER_NAME").cloned();
        let password = vars.get("PASSWORD").cloned();

        let settings: Settings = Config::builder()
            .set_default("server.addr", "0.0.0.0:8050")?
            .set_default("analytics.key_file", DEFAULT_KEY_FILE)?
            .set_default("analytics.scopes", vec![DEFAULT_SCOPE])?
            .set_default("analytics.endpoint", DEFAULT_ENDPOINT)?
            .set_default("analytics.page_size", 10_000_i64)?
            .set_default("analytics.timeout_secs", 60_i64)?
            .set_default("default_view", "252616533")?
            .set_default("default_window", "7daysAgo")?
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("analytics.scopes")
                    .try_parsing(true)
                    .source(Some(vars)),
            )
            .set_override_option("auth.username", username)?
            .set_override_option("auth.password", password)?
            .build()
            .context("Failed to assemble configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.views.is_empty() || self.windows.is_empty() {
            bail!("at least one view and one time window must be configured");
        }
        if self.view(&self.default_view).is_none() {
            bail!("default view {} is not a configured view", self.default_view);
        }
        if self.window(&self.default_window).is_none() {
            bail!(
                "default window {} is not a configured window",
                self.default_window
            );
        }
        for w in &self.windows {
            w.value
                .parse::<crate::dates::StartDate>()
                .with_context(|| format!("window {:?}", w.label))?;
        }
        Ok(())
    }

    pub fn view(&self, value: &str) -> Option<&SelectOption> {
        self.views.iter().find(|v| v.value == value)
    }

    pub fn window(&self, value: &str) -> Option<&SelectOption> {
        self.windows.iter().find(|w| w.value == value)
    }
}

impl AuthSettings {
    /// The single username/password pair gating the dashboard.
    pub fn pair(&self) -> Result<(String, String)> {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) if !u.is_empty() && !p.is_empty() => Ok((u.clone(), p.clone())),
            _ => bail!("USER_NAME and PASSWORD must both be set to serve the dashboard"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults() {
        let s = Settings::from_vars(HashMap::new()).unwrap();
        assert_eq!(s.server.addr, "0.0.0.0:8050");
        assert_eq!(s.analytics.key_file, PathBuf::from(DEFAULT_KEY_FILE));
        assert_eq!(s.analytics.scopes, vec![DEFAULT_SCOPE.to_string()]);
        assert_eq!(s.analytics.page_size, 10_000);
        assert_eq!(s.default_view, "252616533");
        assert_eq!(s.view("277875383").unwrap().label, "Product Page Banner");
        assert!(s.window("30daysAgo").is_some());
        assert!(s.auth.pair().is_err());
    }

    #[test]
    fn env_overrides() {
        let s = Settings::from_vars(vars(&[
            ("SURFACE_SERVER__ADDR", "127.0.0.1:9000"),
            ("SURFACE_ANALYTICS__KEY_FILE", "/tmp/key.json"),
            ("SURFACE_ANALYTICS__PAGE_SIZE", "500"),
            ("SURFACE_DEFAULT_VIEW", "277875383"),
            ("USER_NAME", "marketing"),
            ("PASSWORD", "hunter2"),
        ]))
        .unwrap();
        assert_eq!(s.server.addr, "127.0.0.1:9000");
        assert_eq!(s.analytics.key_file, PathBuf::from("/tmp/key.json"));
        assert_eq!(s.analytics.page_size, 500);
        assert_eq!(s.default_view, "277875383");
        assert_eq!(
            s.auth.pair().unwrap(),
            ("marketing".to_string(), "hunter2".to_string())
        );
    }

    #[test]
    fn unknown_default_view_rejected() {
        let err = Settings::from_vars(vars(&[("SURFACE_DEFAULT_VIEW", "123")])).unwrap_err();
        assert!(err.to_string().contains("123"));
    }

    #[test]
    fn empty_password_rejected() {
        let s = Settings::from_vars(vars(&[("USER_NAME", "a"), ("PASSWORD", "")])).unwrap();
        assert!(s.auth.pair().is_err());
    }
}
