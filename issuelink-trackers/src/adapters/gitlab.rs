//! GitLab integration.
//!
//! `base_url` is the project page (`https://gitlab.com/kiwitcms/integration-testing`),
//! `api_url` the instance root (`https://gitlab.com`) and `api_password` a token with the
//! `api` scope.

use std::cell::OnceCell;

use issuelink_config::{TrackerConfig, TrackerKind};
use issuelink_domain::{CreatedIssue, ExecutionContext, IssueDetails, ReportResult};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};
use url::{form_urlencoded, Url};

use crate::{
    error::{TrackerError, TrackerResult},
    rpc::{AuthMode, RpcConnection},
    tracker::{
        details_or_placeholder, manual_url, memoized_connection, numeric_url_segment,
        path_segment, require, IssueTracker, TrackerServices,
    },
};

const API_PREFIX: &str = "/api/v4";

#[derive(Deserialize)]
struct IssuePayload {
    iid: u64,
    title: String,
    description: Option<String>,
    state: String,
    web_url: String,
}

pub struct GitLabTracker {
    config: TrackerConfig,
    services: TrackerServices,
    rpc: OnceCell<RpcConnection>,
}

impl GitLabTracker {
    pub fn new(config: TrackerConfig, services: TrackerServices) -> Self {
        Self {
            config,
            services,
            rpc: OnceCell::new(),
        }
    }

    /// URL-encoded `namespace/project` path, usable as a project id in API paths.
    pub fn repo_id(&self) -> TrackerResult<String> {
        repo_id(self.config.base_url())
    }

    fn create_issue(&self, title: &str, description: &str) -> TrackerResult<CreatedIssue> {
        let project = self.repo_id()?;
        let issue: IssuePayload = self.connect()?.post(
            &format!("/projects/{project}/issues"),
            &json!({"title": title, "description": description}),
            "new issue",
        )?;
        Ok(CreatedIssue {
            id: issue.iid.to_string(),
            url: issue.web_url,
        })
    }

    fn fetch_issue(&self, iid: &str) -> TrackerResult<IssuePayload> {
        let project = self.repo_id()?;
        self.connect()?.get(
            &format!("/projects/{project}/issues/{}", path_segment(iid)),
            &format!("issue #{iid}"),
        )
    }
}

impl IssueTracker for GitLabTracker {
    fn kind(&self) -> TrackerKind {
        TrackerKind::GitLab
    }

    fn config(&self) -> &TrackerConfig {
        &self.config
    }

    fn connect(&self) -> TrackerResult<&RpcConnection> {
        memoized_connection(&self.rpc, || {
            let api_url = require(&self.config, self.config.api_url.as_deref(), "api_url")?;
            let token = require(&self.config, self.config.api_password.as_deref(), "api_password")?;
            let root = api_url.trim_end_matches('/').trim_end_matches(API_PREFIX);

            RpcConnection::new(
                &self.config,
                format!("{root}{API_PREFIX}"),
                AuthMode::Header {
                    name: "PRIVATE-TOKEN",
                    value: token.to_string(),
                },
            )
        })
    }

    fn is_adding_testcase_to_issue_disabled(&self) -> bool {
        self.config.base_url.is_none()
            || self.config.api_url.is_none()
            || self.config.credentials().secret.is_none()
    }

    fn bug_id_from_url(&self, url: &str) -> String {
        numeric_url_segment(url)
    }

    fn details(&self, url: &str) -> TrackerResult<IssueDetails> {
        let iid = self.bug_id_from_url(url);
        let result = self.fetch_issue(&iid).map(|issue| IssueDetails {
            id: issue.iid.to_string(),
            description: issue.description.unwrap_or_default(),
            status: issue.state,
            title: issue.title,
            url: url.to_string(),
        });
        details_or_placeholder(self, url, result)
    }

    fn report_issue(&self, execution: &ExecutionContext, user: &str) -> ReportResult {
        let title = execution.issue_title();
        let description = self.services.formatter.render(execution, Some(user), None);

        match self.create_issue(&title, &description) {
            Ok(issue) => {
                info!(tracker = %self.config.name, iid = %issue.id, "created GitLab issue");
                self.services.record_defect(execution, &issue.url);
                ReportResult::created(issue)
            }
            Err(error) => {
                warn!(
                    tracker = %self.config.name,
                    error = %error,
                    "GitLab issue creation failed, falling back to manual report"
                );
                ReportResult::manual(manual_url(
                    &project_page(self.config.base_url()),
                    "/-/issues/new",
                    &[
                        ("issue[title]", title.as_str()),
                        ("issue[description]", description.as_str()),
                    ],
                ))
            }
        }
    }

    fn post_comment(&self, execution: &ExecutionContext, bug_id: &str) -> TrackerResult<()> {
        let issue = self.fetch_issue(bug_id)?;
        let project = self.repo_id()?;
        let text = self.services.formatter.render(execution, None, None);
        let _: Value = self.connect()?.post(
            &format!("/projects/{project}/issues/{}/notes", issue.iid),
            &json!({"body": text}),
            &format!("note on #{}", issue.iid),
        )?;
        Ok(())
    }
}

pub fn repo_id(base_url: &str) -> TrackerResult<String> {
    let (_, path) = project_path(base_url)?;
    Ok(form_urlencoded::byte_serialize(path.as_bytes()).collect())
}

/// Project web page rebuilt from the instance origin and the project path.
pub fn project_page(base_url: &str) -> String {
    match project_path(base_url) {
        Ok((parsed, path)) => format!("{}/{path}", parsed.origin().ascii_serialization()),
        Err(_) => base_url.trim().trim_end_matches('/').to_string(),
    }
}

fn project_path(base_url: &str) -> TrackerResult<(Url, String)> {
    let parsed = Url::parse(base_url.trim()).map_err(|error| TrackerError::InvalidUrl {
        url: base_url.to_string(),
        reason: error.to_string(),
    })?;
    let path = parsed.path().trim_matches('/');
    let path = path.strip_suffix(".git").unwrap_or(path).to_string();
    if path.is_empty() {
        return Err(TrackerError::InvalidUrl {
            url: base_url.to_string(),
            reason: "expected a project URL like https://gitlab.com/group/project".to_string(),
        });
    }
    Ok((parsed, path))
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use issuelink_config::{TrackerConfig, TrackerKind};
    use issuelink_domain::InMemoryLinkRecorder;

    use super::{project_page, repo_id, GitLabTracker};
    use crate::{
        rpc::AuthMode,
        tracker::{IssueTracker, TrackerServices},
    };

    fn tracker(api_url: Option<&str>) -> GitLabTracker {
        let mut config = TrackerConfig::new("gitlab", TrackerKind::GitLab);
        config.base_url = Some("https://gitlab.com/kiwitcms/integration-testing".to_string());
        config.api_url = api_url.map(str::to_string);
        config.api_password = Some("glpat-x".to_string());
        GitLabTracker::new(
            config,
            TrackerServices::with_markdown(Rc::new(InMemoryLinkRecorder::new())),
        )
    }

    #[test]
    fn repo_id_is_url_encoded_project_path() {
        assert_eq!(
            repo_id("https://gitlab.com/kiwitcms/integration-testing").expect("repo"),
            "kiwitcms%2Fintegration-testing"
        );
        assert_eq!(
            repo_id("https://gitlab.example.com/group/sub/project.git/").expect("repo"),
            "group%2Fsub%2Fproject"
        );
        assert!(repo_id("https://gitlab.com/").is_err());
    }

    #[test]
    fn project_page_drops_git_suffix() {
        assert_eq!(
            project_page("https://gitlab.com/group/sub/project.git"),
            "https://gitlab.com/group/sub/project"
        );
        assert_eq!(
            project_page("https://gitlab.example.com:8443/group/project/"),
            "https://gitlab.example.com:8443/group/project"
        );
    }

    #[test]
    fn disabled_without_api_url() {
        assert!(tracker(None).is_adding_testcase_to_issue_disabled());
        assert!(!tracker(Some("https://gitlab.com")).is_adding_testcase_to_issue_disabled());
    }

    #[test]
    fn connects_with_private_token_to_api_root() {
        let gitlab = tracker(Some("https://gitlab.com/api/v4/"));
        let rpc = gitlab.connect().expect("connection");

        assert_eq!(rpc.api_base(), "https://gitlab.com/api/v4");
        assert_eq!(
            rpc.auth(),
            &AuthMode::Header {
                name: "PRIVATE-TOKEN",
                value: "glpat-x".to_string()
            }
        );
    }

    #[test]
    fn bug_id_is_the_issue_iid() {
        assert_eq!(
            tracker(None)
                .bug_id_from_url("https://gitlab.com/kiwitcms/integration-testing/-/issues/3"),
            "3"
        );
    }
}
