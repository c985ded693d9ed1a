use std::{
    env, fs,
    fs::OpenOptions,
    io::Write,
    path::PathBuf,
};

use anyhow::{Context, Result};
use issuelink_domain::{ExecutionContext, LinkRecorder, LinkReference};
use tracing::debug;

/// Link references stored one JSON object per line.
pub struct FileLinkRecorder {
    path: PathBuf,
}

impl FileLinkRecorder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> Result<Vec<LinkReference>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let payload = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read links at {}", self.path.display()))?;
        payload
            .lines()
            .filter(|line| !line.trim().is_empty())
            .enumerate()
            .map(|(index, line)| {
                serde_json::from_str(line).with_context(|| {
                    format!("invalid link on line {} of {}", index + 1, self.path.display())
                })
            })
            .collect()
    }
}

impl LinkRecorder for FileLinkRecorder {
    fn get_or_create(
        &self,
        execution: &ExecutionContext,
        url: &str,
        is_defect: bool,
    ) -> Result<LinkReference> {
        if let Some(existing) = self
            .load()?
            .into_iter()
            .find(|link| link.execution_id == execution.execution_id && link.url == url)
        {
            return Ok(existing);
        }

        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let link = LinkReference {
            execution_id: execution.execution_id,
            url: url.to_string(),
            is_defect,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open links at {}", self.path.display()))?;
        writeln!(file, "{}", serde_json::to_string(&link)?)
            .with_context(|| format!("failed to write links at {}", self.path.display()))?;
        debug!(path = %self.path.display(), url, "recorded link reference");

        Ok(link)
    }
}

pub fn default_links_path() -> PathBuf {
    let mut base = env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    base.push(".local");
    base.push("share");
    base.push("issuelink");
    base.push("links.jsonl");
    base
}
