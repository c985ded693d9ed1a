//! GitHub integration.
//!
//! `base_url` points at the repository issues are filed against and `api_password` holds a
//! token with `repo` or `public_repo` scope. `api_url` is only needed for GitHub Enterprise.

use std::cell::OnceCell;

use issuelink_config::{TrackerConfig, TrackerKind};
use issuelink_domain::{CreatedIssue, ExecutionContext, IssueDetails, ReportResult};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};
use url::Url;

use crate::{
    error::{TrackerError, TrackerResult},
    rpc::{AuthMode, RpcConnection},
    tracker::{
        details_or_placeholder, manual_url, memoized_connection, numeric_url_segment,
        path_segment, require, IssueTracker, TrackerServices,
    },
};

pub const DEFAULT_API_URL: &str = "https://api.github.com";

#[derive(Deserialize)]
struct IssuePayload {
    number: u64,
    title: String,
    body: Option<String>,
    state: String,
    html_url: String,
}

pub struct GitHubTracker {
    config: TrackerConfig,
    services: TrackerServices,
    rpc: OnceCell<RpcConnection>,
}

impl GitHubTracker {
    pub fn new(config: TrackerConfig, services: TrackerServices) -> Self {
        Self {
            config,
            services,
            rpc: OnceCell::new(),
        }
    }

    pub fn repo_id(&self) -> TrackerResult<String> {
        repo_id(self.config.base_url())
    }

    fn create_issue(&self, title: &str, body: &str) -> TrackerResult<CreatedIssue> {
        let repo = self.repo_id()?;
        let issue: IssuePayload = self.connect()?.post(
            &format!("/repos/{repo}/issues"),
            &json!({"title": title, "body": body}),
            "new issue",
        )?;
        Ok(CreatedIssue {
            id: issue.number.to_string(),
            url: issue.html_url,
        })
    }

    fn fetch_issue(&self, number: &str) -> TrackerResult<IssuePayload> {
        let repo = self.repo_id()?;
        self.connect()?.get(
            &format!("/repos/{repo}/issues/{}", path_segment(number)),
            &format!("issue #{number} in {repo}"),
        )
    }
}

impl IssueTracker for GitHubTracker {
    fn kind(&self) -> TrackerKind {
        TrackerKind::GitHub
    }

    fn config(&self) -> &TrackerConfig {
        &self.config
    }

    fn connect(&self) -> TrackerResult<&RpcConnection> {
        memoized_connection(&self.rpc, || {
            // token only, the username is never used
            let token = require(&self.config, self.config.api_password.as_deref(), "api_password")?;
            RpcConnection::new(
                &self.config,
                self.config.api_url.as_deref().unwrap_or(DEFAULT_API_URL),
                AuthMode::Bearer {
                    token: token.to_string(),
                },
            )
        })
    }

    fn is_adding_testcase_to_issue_disabled(&self) -> bool {
        self.config.base_url.is_none() || self.config.credentials().secret.is_none()
    }

    fn bug_id_from_url(&self, url: &str) -> String {
        numeric_url_segment(url)
    }

    fn details(&self, url: &str) -> TrackerResult<IssueDetails> {
        let result = self.fetch_issue(&self.bug_id_from_url(url)).map(|issue| IssueDetails {
            id: issue.number.to_string(),
            description: issue.body.unwrap_or_default(),
            status: issue.state,
            title: issue.title,
            url: url.to_string(),
        });
        details_or_placeholder(self, url, result)
    }

    fn report_issue(&self, execution: &ExecutionContext, user: &str) -> ReportResult {
        let title = execution.issue_title();
        let body = self.services.formatter.render(execution, Some(user), None);

        match self.create_issue(&title, &body) {
            Ok(issue) => {
                info!(tracker = %self.config.name, number = %issue.id, "created GitHub issue");
                self.services.record_defect(execution, &issue.url);
                ReportResult::created(issue)
            }
            Err(error) => {
                warn!(
                    tracker = %self.config.name,
                    error = %error,
                    "GitHub issue creation failed, falling back to manual report"
                );
                ReportResult::manual(manual_url(
                    &repository_page(self.config.base_url()),
                    "/issues/new",
                    &[("title", title.as_str()), ("body", body.as_str())],
                ))
            }
        }
    }

    fn post_comment(&self, execution: &ExecutionContext, bug_id: &str) -> TrackerResult<()> {
        let issue = self.fetch_issue(bug_id)?;
        let repo = self.repo_id()?;
        let text = self.services.formatter.render(execution, None, None);
        let _: Value = self.connect()?.post(
            &format!("/repos/{repo}/issues/{}/comments", issue.number),
            &json!({"body": text}),
            &format!("comment on #{}", issue.number),
        )?;
        Ok(())
    }
}

/// `owner/repo` from a repository URL such as `https://github.com/kiwitcms/tcms.git`.
pub fn repo_id(base_url: &str) -> TrackerResult<String> {
    repository(base_url).map(|(_, repo)| repo)
}

/// Web page of the repository, without `.git` or anything after `owner/repo`.
pub fn repository_page(base_url: &str) -> String {
    match repository(base_url) {
        Ok((parsed, repo)) => format!("{}/{repo}", parsed.origin().ascii_serialization()),
        Err(_) => base_url.trim().trim_end_matches('/').to_string(),
    }
}

fn repository(base_url: &str) -> TrackerResult<(Url, String)> {
    let invalid = |reason: &str| TrackerError::InvalidUrl {
        url: base_url.to_string(),
        reason: reason.to_string(),
    };
    let parsed = Url::parse(base_url.trim()).map_err(|error| invalid(&error.to_string()))?;
    let mut segments = parsed
        .path_segments()
        .into_iter()
        .flatten()
        .filter(|segment| !segment.is_empty());

    let repo = match (segments.next(), segments.next()) {
        (Some(owner), Some(repo)) => {
            format!("{owner}/{}", repo.strip_suffix(".git").unwrap_or(repo))
        }
        _ => return Err(invalid("expected a repository URL like https://github.com/owner/repo")),
    };
    Ok((parsed, repo))
}
