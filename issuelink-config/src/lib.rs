use std::{
    collections::HashSet,
    env, fmt, fs,
    path::{Path, PathBuf},
    process::Command,
    str::FromStr,
};

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;

pub const DEFAULT_JIRA_ISSUE_TYPE: &str = "Bug";
pub const DEFAULT_REDMINE_TRACKER: &str = "Bugs";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Which vendor a configured tracker talks to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TrackerKind {
    Jira,
    GitHub,
    GitLab,
    Redmine,
}

impl TrackerKind {
    pub const ALL: [TrackerKind; 4] = [
        TrackerKind::Jira,
        TrackerKind::GitHub,
        TrackerKind::GitLab,
        TrackerKind::Redmine,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TrackerKind::Jira => "jira",
            TrackerKind::GitHub => "github",
            TrackerKind::GitLab => "gitlab",
            TrackerKind::Redmine => "redmine",
        }
    }
}

impl fmt::Display for TrackerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrackerKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        let normalized = value.trim().to_ascii_lowercase();
        TrackerKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| anyhow!("unsupported tracker type '{}'", value.trim()))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct JiraOptions {
    pub api_version: Option<String>,
}

impl JiraOptions {
    pub fn api_version(&self) -> &str {
        match self.api_version.as_deref() {
            Some("3") => "3",
            _ => "2",
        }
    }
}

/// Username plus an opaque secret, which may be a password or an API token.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: Option<String>,
    pub secret: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    pub name: String,
    pub kind: TrackerKind,
    pub base_url: Option<String>,
    pub api_url: Option<String>,
    pub api_username: Option<String>,
    pub api_password: Option<String>,
    pub issue_type_name: Option<String>,
    pub tracker_name: Option<String>,
    pub jira: JiraOptions,
    pub insecure: bool,
    pub timeout_secs: u64,
}

impl fmt::Debug for TrackerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackerConfig")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("base_url", &self.base_url)
            .field("api_url", &self.api_url)
            .field("credentials", &self.credentials())
            .field("issue_type_name", &self.issue_type_name)
            .field("tracker_name", &self.tracker_name)
            .field("jira", &self.jira)
            .field("insecure", &self.insecure)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl TrackerConfig {
    /// An empty configuration for `kind`; every optional field unset.
    pub fn new(name: impl Into<String>, kind: TrackerKind) -> Self {
        Self {
            name: name.into(),
            kind,
            base_url: None,
            api_url: None,
            api_username: None,
            api_password: None,
            issue_type_name: None,
            tracker_name: None,
            jira: JiraOptions::default(),
            insecure: false,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            username: self.api_username.clone(),
            secret: self.api_password.clone(),
        }
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or_default()
    }

    pub fn issue_type_name(&self) -> &str {
        self.issue_type_name
            .as_deref()
            .unwrap_or(DEFAULT_JIRA_ISSUE_TYPE)
    }

    pub fn tracker_name(&self) -> &str {
        self.tracker_name.as_deref().unwrap_or(DEFAULT_REDMINE_TRACKER)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssueLinkConfig {
    pub default_tracker: Option<String>,
    pub trackers: Vec<TrackerConfig>,
}

#[derive(Default, Deserialize)]
struct RawConfig {
    default_tracker: Option<String>,
    #[serde(default)]
    trackers: Vec<RawTracker>,
}

#[derive(Default, Deserialize)]
struct RawTracker {
    name: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    base_url: Option<String>,
    api_url: Option<String>,
    api_username: Option<String>,
    api_password: Option<String>,
    issue_type: Option<String>,
    tracker_name: Option<String>,
    insecure: Option<bool>,
    timeout_secs: Option<u64>,
    #[serde(default)]
    jira: RawJira,
}

#[derive(Default, Deserialize)]
struct RawJira {
    api_version: Option<String>,
}

impl IssueLinkConfig {
    pub fn load_default() -> Result<Self> {
        Self::load_from_path(&default_config_path())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let payload = fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        Self::from_yaml(&payload)
            .with_context(|| format!("invalid config at {}", path.display()))
    }

    pub fn from_yaml(payload: &str) -> Result<Self> {
        let raw: RawConfig =
            serde_yaml::from_str(payload).with_context(|| "invalid YAML config format")?;
        Self::from_raw(raw, fetch_secret_from_manager)
    }

    /// Finds a tracker by name, or falls back to `default_tracker` and then to the first entry.
    pub fn resolve_tracker(&self, requested_name: Option<&str>) -> Result<&TrackerConfig> {
        if let Some(name) = requested_name.or(self.default_tracker.as_deref()) {
            return self
                .trackers
                .iter()
                .find(|tracker| tracker.name == name)
                .ok_or_else(|| anyhow!("tracker '{}' not found in configuration", name));
        }

        self.trackers
            .first()
            .ok_or_else(|| anyhow!("no trackers configured"))
    }

    fn from_raw<F>(raw: RawConfig, fetch: F) -> Result<Self>
    where
        F: Fn(&str, &str) -> Option<String>,
    {
        let mut seen = HashSet::new();
        let mut trackers = Vec::with_capacity(raw.trackers.len());

        for (index, entry) in raw.trackers.into_iter().enumerate() {
            let kind = entry
                .kind
                .as_deref()
                .and_then(non_empty_str)
                .ok_or_else(|| anyhow!("tracker #{} has no type", index + 1))?
                .parse::<TrackerKind>()
                .with_context(|| format!("tracker #{} has an invalid type", index + 1))?;
            let name = entry
                .name
                .and_then(non_empty)
                .unwrap_or_else(|| kind.as_str().to_string());
            if !seen.insert(name.clone()) {
                bail!("tracker name '{}' is defined more than once", name);
            }

            trackers.push(TrackerConfig {
                name,
                kind,
                base_url: entry.base_url.and_then(normalize_url),
                api_url: entry.api_url.and_then(normalize_url),
                api_username: entry.api_username.and_then(non_empty),
                api_password: entry
                    .api_password
                    .and_then(|value| resolve_secret_with(value, &fetch)),
                issue_type_name: entry.issue_type.and_then(non_empty),
                tracker_name: entry.tracker_name.and_then(non_empty),
                jira: JiraOptions {
                    api_version: entry.jira.api_version.and_then(non_empty),
                },
                insecure: entry.insecure.unwrap_or(false),
                timeout_secs: entry
                    .timeout_secs
                    .filter(|secs| *secs > 0)
                    .unwrap_or(DEFAULT_TIMEOUT_SECS),
            });
        }

        Ok(Self {
            default_tracker: raw.default_tracker.and_then(non_empty),
            trackers,
        })
    }
}

pub fn default_config_path() -> PathBuf {
    if let Some(override_path) = env::var_os("ISSUELINK_CONFIG_FILE") {
        return PathBuf::from(override_path);
    }

    let mut base = env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    base.push(".config");
    base.push("issuelink");
    base.push("config.yaml");
    base
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_string())
}

fn non_empty_str(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed)
}

fn normalize_url(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        Some(trimmed.trim_end_matches('/').to_string())
    } else {
        Some(format!("https://{}", trimmed.trim_end_matches('/')))
    }
}

fn resolve_secret_with<F>(value: String, fetch: F) -> Option<String>
where
    F: Fn(&str, &str) -> Option<String>,
{
    let secret = non_empty(value)?;
    let Some((provider, key)) = parse_secret_reference(secret.as_str()) else {
        return Some(secret);
    };
    fetch(provider, key)
}

fn parse_secret_reference(value: &str) -> Option<(&str, &str)> {
    let (provider, key) = value.split_once("::")?;
    if key.trim().is_empty() {
        return None;
    }
    if provider == "pass" || provider == "passage" {
        Some((provider, key.trim()))
    } else {
        None
    }
}

fn fetch_secret_from_manager(provider: &str, key: &str) -> Option<String> {
    let output = Command::new(provider).arg("show").arg(key).output().ok()?;
    if !output.status.success() {
        return None;
    }

    // pass prints the secret on the first line, metadata may follow
    let stdout = String::from_utf8_lossy(&output.stdout);
    stdout.lines().next().map(str::to_string).and_then(non_empty)
}
