//! JIRA integration.
//!
//! Needs `base_url` (for example `https://kiwitcms.atlassian.net`), `api_username` (the
//! account email) and `api_password` (an API token). `api_url` is not used.
//!
//! Descriptions are capped at 30,000 characters for the REST create call and at 6,000
//! characters for the fallback GET link; JIRA answers 400/414/500 beyond those.

use std::cell::OnceCell;

use issuelink_config::{TrackerConfig, TrackerKind};
use issuelink_domain::{CreatedIssue, ExecutionContext, IssueDetails, ReportResult};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::{
    error::{TrackerError, TrackerResult},
    rpc::{AuthMode, RpcConnection},
    tracker::{
        details_or_placeholder, manual_url, match_or_first, memoized_connection, path_segment,
        require, IssueTracker, TrackerServices,
    },
};

pub const API_DESCRIPTION_LIMIT: usize = 30_000;
pub const MANUAL_DESCRIPTION_LIMIT: usize = 6_000;

const CREATE_PAGE: &str = "/secure/CreateIssueDetails!init.jspa";

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct JiraProject {
    pub id: String,
    pub key: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct JiraIssueType {
    pub id: String,
    pub name: String,
}

#[derive(Default, Deserialize)]
struct ProjectDetailPayload {
    #[serde(rename = "issueTypes", default)]
    issue_types: Vec<JiraIssueType>,
}

#[derive(Deserialize)]
struct CreatedPayload {
    key: String,
}

#[derive(Deserialize)]
struct IssuePayload {
    key: String,
    #[serde(default)]
    fields: IssueFields,
}

#[derive(Default, Deserialize)]
struct IssueFields {
    summary: Option<String>,
    status: Option<NameLike>,
    description: Option<Value>,
}

#[derive(Default, Deserialize)]
struct NameLike {
    name: Option<String>,
}

pub struct JiraTracker {
    config: TrackerConfig,
    services: TrackerServices,
    rpc: OnceCell<RpcConnection>,
}

impl JiraTracker {
    pub fn new(config: TrackerConfig, services: TrackerServices) -> Self {
        Self {
            config,
            services,
            rpc: OnceCell::new(),
        }
    }

    /// JIRA project whose name or key equals the product name, else the first project.
    pub fn project_for(&self, execution: &ExecutionContext) -> TrackerResult<JiraProject> {
        let projects: Vec<JiraProject> = self.connect()?.get("/project", "project list")?;
        match_or_first(projects, &execution.product_name, |project| {
            vec![project.name.as_str(), project.key.as_str()]
        })
        .ok_or(TrackerError::EmptyListing {
            vendor: TrackerKind::Jira,
            what: "projects",
        })
    }

    /// Configured issue type of `project`, else its first type, else the first global type.
    pub fn issue_type_for(&self, project: &JiraProject) -> TrackerResult<JiraIssueType> {
        let rpc = self.connect()?;
        let wanted = self.config.issue_type_name();
        let detail: ProjectDetailPayload = rpc.get(
            &format!("/project/{}", project.key),
            &format!("project {}", project.key),
        )?;

        let issue_types = if detail.issue_types.is_empty() {
            rpc.get::<Vec<JiraIssueType>>("/issuetype", "issue type list")?
        } else {
            detail.issue_types
        };

        match_or_first(issue_types, wanted, |issue_type| vec![issue_type.name.as_str()]).ok_or(
            TrackerError::EmptyListing {
                vendor: TrackerKind::Jira,
                what: "issue types",
            },
        )
    }

    fn create_issue(
        &self,
        project: &JiraProject,
        issue_type: &JiraIssueType,
        execution: &ExecutionContext,
        user: &str,
    ) -> TrackerResult<CreatedIssue> {
        let description = self
            .services
            .formatter
            .render(execution, Some(user), Some(API_DESCRIPTION_LIMIT));
        let payload = json!({
            "fields": {
                "project": {"id": project.id},
                "issuetype": {"name": issue_type.name},
                "summary": execution.issue_title(),
                "description": self.text_payload(&description),
            }
        });

        let created: CreatedPayload = self.connect()?.post("/issue", &payload, "new issue")?;
        Ok(CreatedIssue {
            url: format!("{}/browse/{}", self.config.base_url(), created.key),
            id: created.key,
        })
    }

    fn manual_report_url(
        &self,
        project: Option<&JiraProject>,
        issue_type: Option<&JiraIssueType>,
        execution: &ExecutionContext,
        user: &str,
    ) -> String {
        let summary = execution.issue_title();
        let description = self
            .services
            .formatter
            .render(execution, Some(user), Some(MANUAL_DESCRIPTION_LIMIT));

        let mut params = Vec::with_capacity(4);
        if let Some(project) = project {
            params.push(("pid", project.id.as_str()));
        }
        if let Some(issue_type) = issue_type {
            params.push(("issuetype", issue_type.id.as_str()));
        }
        params.push(("summary", summary.as_str()));
        params.push(("description", description.as_str()));

        manual_url(self.config.base_url(), CREATE_PAGE, &params)
    }

    fn fetch_details(&self, url: &str) -> TrackerResult<IssueDetails> {
        let key = self.bug_id_from_url(url);
        let issue: IssuePayload = self.connect()?.get_with_query(
            &format!("/issue/{}", path_segment(&key)),
            &[("fields", "summary,status,description")],
            &format!("issue {key}"),
        )?;

        let fields = issue.fields;
        Ok(IssueDetails {
            id: issue.key,
            description: description_text(fields.description.as_ref()),
            status: fields
                .status
                .and_then(|status| status.name)
                .unwrap_or_else(|| "Unknown".to_string()),
            title: fields.summary.unwrap_or_default(),
            url: url.to_string(),
        })
    }

    /// Plain text for REST v2, Atlassian Document Format for v3.
    fn text_payload(&self, text: &str) -> Value {
        if self.config.jira.api_version() == "3" {
            json!({
                "type": "doc",
                "version": 1,
                "content": [
                    {
                        "type": "paragraph",
                        "content": [
                            {"type": "text", "text": text}
                        ]
                    }
                ]
            })
        } else {
            Value::String(text.to_string())
        }
    }
}

impl IssueTracker for JiraTracker {
    fn kind(&self) -> TrackerKind {
        TrackerKind::Jira
    }

    fn config(&self) -> &TrackerConfig {
        &self.config
    }

    fn connect(&self) -> TrackerResult<&RpcConnection> {
        memoized_connection(&self.rpc, || {
            let base_url = require(&self.config, self.config.base_url.as_deref(), "base_url")?;
            let user = require(&self.config, self.config.api_username.as_deref(), "api_username")?;
            let password =
                require(&self.config, self.config.api_password.as_deref(), "api_password")?;

            RpcConnection::new(
                &self.config,
                format!("{base_url}/rest/api/{}", self.config.jira.api_version()),
                AuthMode::Basic {
                    user: user.to_string(),
                    password: password.to_string(),
                },
            )
        })
    }

    fn is_adding_testcase_to_issue_disabled(&self) -> bool {
        let credentials = self.config.credentials();
        self.config.base_url.is_none()
            || credentials.username.is_none()
            || credentials.secret.is_none()
    }

    fn details(&self, url: &str) -> TrackerResult<IssueDetails> {
        details_or_placeholder(self, url, self.fetch_details(url))
    }

    fn report_issue(&self, execution: &ExecutionContext, user: &str) -> ReportResult {
        let project = self
            .project_for(execution)
            .inspect_err(|error| {
                warn!(tracker = %self.config.name, error = %error, "could not resolve JIRA project")
            })
            .ok();
        let issue_type = project.as_ref().and_then(|project| {
            self.issue_type_for(project)
                .inspect_err(|error| {
                    warn!(
                        tracker = %self.config.name,
                        project = %project.key,
                        error = %error,
                        "could not resolve JIRA issue type"
                    )
                })
                .ok()
        });

        if let (Some(project), Some(issue_type)) = (&project, &issue_type) {
            match self.create_issue(project, issue_type, execution, user) {
                Ok(issue) => {
                    info!(tracker = %self.config.name, key = %issue.id, "created JIRA issue");
                    self.services.record_defect(execution, &issue.url);
                    return ReportResult::created(issue);
                }
                Err(error) => warn!(
                    tracker = %self.config.name,
                    error = %error,
                    "JIRA rejected issue, falling back to manual report"
                ),
            }
        }

        ReportResult::manual(self.manual_report_url(
            project.as_ref(),
            issue_type.as_ref(),
            execution,
            user,
        ))
    }

    fn post_comment(&self, execution: &ExecutionContext, bug_id: &str) -> TrackerResult<()> {
        let text = self.services.formatter.render(execution, None, None);
        let _: Value = self.connect()?.post(
            &format!("/issue/{}/comment", path_segment(bug_id)),
            &json!({"body": self.text_payload(&text)}),
            &format!("comment on {bug_id}"),
        )?;
        Ok(())
    }
}

// Inverse of `text_payload`: v2 answers with a string, v3 with an ADF document.
fn description_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(text)) => text.clone(),
        Some(doc) if doc.get("type").and_then(Value::as_str) == Some("doc") => {
            let mut lines = Vec::new();
            collect_blocks(doc, &mut lines);
            lines.join("\n").trim().to_string()
        }
        _ => String::new(),
    }
}

fn collect_blocks(node: &Value, lines: &mut Vec<String>) {
    for child in adf_children(node) {
        match child.get("type").and_then(Value::as_str) {
            Some("paragraph" | "heading" | "codeBlock") => lines.push(inline_text(child)),
            _ => collect_blocks(child, lines),
        }
    }
}

fn inline_text(node: &Value) -> String {
    adf_children(node)
        .map(|child| match child.get("type").and_then(Value::as_str) {
            Some("text") => child
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            Some("hardBreak") => "\n".to_string(),
            _ => inline_text(child),
        })
        .collect()
}

fn adf_children<'a>(node: &'a Value) -> impl Iterator<Item = &'a Value> {
    node.get("content")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use issuelink_config::{JiraOptions, TrackerConfig, TrackerKind};
    use issuelink_domain::InMemoryLinkRecorder;
    use serde_json::json;

    use super::{description_text, JiraTracker};
    use crate::tracker::{IssueTracker, TrackerServices};

    fn tracker(api_version: Option<&str>) -> JiraTracker {
        let mut config = TrackerConfig::new("jira", TrackerKind::Jira);
        config.base_url = Some("https://kiwitcms.atlassian.net".to_string());
        config.api_username = Some("qa@example.com".to_string());
        config.api_password = Some("token".to_string());
        config.jira = JiraOptions {
            api_version: api_version.map(str::to_string),
        };
        JiraTracker::new(
            config,
            TrackerServices::with_markdown(Rc::new(InMemoryLinkRecorder::new())),
        )
    }

    #[test]
    fn disabled_without_username() {
        let mut config = TrackerConfig::new("jira", TrackerKind::Jira);
        config.base_url = Some("https://kiwitcms.atlassian.net".to_string());
        config.api_password = Some("token".to_string());
        let jira = JiraTracker::new(
            config,
            TrackerServices::with_markdown(Rc::new(InMemoryLinkRecorder::new())),
        );

        assert!(jira.is_adding_testcase_to_issue_disabled());
        assert!(!tracker(None).is_adding_testcase_to_issue_disabled());
    }

    #[test]
    fn bug_id_is_the_issue_key() {
        assert_eq!(
            tracker(None).bug_id_from_url("https://issues.jenkins-ci.org/browse/JENKINS-31044"),
            "JENKINS-31044"
        );
    }

    #[test]
    fn text_payload_shape_follows_api_version() {
        assert_eq!(tracker(Some("2")).text_payload("hello"), json!("hello"));
        assert_eq!(
            tracker(Some("3")).text_payload("hello"),
            json!({
                "type": "doc",
                "version": 1,
                "content": [{
                    "type": "paragraph",
                    "content": [{"type": "text", "text": "hello"}]
                }]
            })
        );
    }

    #[test]
    fn connection_uses_basic_auth_against_rest_root() {
        let jira = tracker(Some("3"));
        let rpc = jira.connect().expect("connection");

        assert_eq!(rpc.api_base(), "https://kiwitcms.atlassian.net/rest/api/3");
        assert!(std::ptr::eq(rpc, jira.connect().expect("memoized")));
    }

    #[test]
    fn flattens_adf_description() {
        let doc = json!({
            "type": "doc",
            "content": [
                {"type": "paragraph", "content": [{"type": "text", "text": "Hello"}]},
                {"type": "bulletList", "content": [
                    {"type": "listItem", "content": [
                        {"type": "paragraph", "content": [
                            {"type": "text", "text": "Safari"},
                            {"type": "hardBreak"},
                            {"type": "text", "text": "17"}
                        ]}
                    ]}
                ]}
            ]
        });

        assert_eq!(description_text(Some(&doc)), "Hello\nSafari\n17");
        assert_eq!(description_text(Some(&json!("plain"))), "plain");
        assert_eq!(description_text(Some(&json!({"type": "panel"}))), "");
        assert_eq!(description_text(None), "");
    }

    #[test]
    fn text_payload_round_trips_through_description_text() {
        let jira = tracker(Some("3"));
        let text = "**Product:** Kiwi";
        assert_eq!(description_text(Some(&jira.text_payload(text))), text);
    }
}
