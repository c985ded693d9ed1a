//! Redmine integration.
//!
//! `base_url` is the Redmine instance. With `api_username` set, `api_password` is that user's
//! password; without it, `api_password` is treated as the account's API access key.

use std::cell::OnceCell;

use issuelink_config::{TrackerConfig, TrackerKind};
use issuelink_domain::{CreatedIssue, ExecutionContext, IssueDetails, ReportResult};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::{
    error::{TrackerError, TrackerResult},
    rpc::{AuthMode, RpcConnection},
    tracker::{
        details_or_placeholder, manual_url, match_or_first, memoized_connection, path_segment,
        require, IssueTracker, TrackerServices,
    },
};

const PROJECT_PAGE_SIZE: usize = 100;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct RedmineProject {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub identifier: String,
}

/// Any `{id, name}` record: trackers, statuses, priorities.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct NamedRef {
    pub id: u64,
    pub name: String,
}

#[derive(Deserialize)]
struct ProjectsPayload {
    #[serde(default)]
    projects: Vec<RedmineProject>,
    #[serde(default)]
    total_count: usize,
}

#[derive(Deserialize)]
struct ProjectPayload {
    project: ProjectTrackers,
}

#[derive(Deserialize)]
struct ProjectTrackers {
    #[serde(default)]
    trackers: Vec<NamedRef>,
}

#[derive(Deserialize)]
struct StatusesPayload {
    #[serde(default)]
    issue_statuses: Vec<NamedRef>,
}

#[derive(Deserialize)]
struct PrioritiesPayload {
    #[serde(default)]
    issue_priorities: Vec<NamedRef>,
}

#[derive(Deserialize)]
struct IssueEnvelope {
    issue: IssuePayload,
}

#[derive(Deserialize)]
struct IssuePayload {
    id: u64,
    #[serde(default)]
    subject: String,
    description: Option<String>,
    status: Option<NamedRef>,
}

/// Everything a new issue needs, resolved against the live instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssueTarget {
    pub project: RedmineProject,
    pub tracker: NamedRef,
    pub status: NamedRef,
    pub priority: NamedRef,
}

pub struct RedmineTracker {
    config: TrackerConfig,
    services: TrackerServices,
    rpc: OnceCell<RpcConnection>,
}

impl RedmineTracker {
    pub fn new(config: TrackerConfig, services: TrackerServices) -> Self {
        Self {
            config,
            services,
            rpc: OnceCell::new(),
        }
    }

    pub fn project_by_name(&self, name: &str) -> TrackerResult<RedmineProject> {
        let projects = self.all_projects()?;
        match_or_first(projects, name, |project| {
            vec![project.name.as_str(), project.identifier.as_str()]
        })
        .ok_or(TrackerError::EmptyListing {
            vendor: TrackerKind::Redmine,
            what: "projects",
        })
    }

    /// Every visible project, walking `/projects.json` page by page.
    pub fn all_projects(&self) -> TrackerResult<Vec<RedmineProject>> {
        let rpc = self.connect()?;
        let limit = PROJECT_PAGE_SIZE.to_string();
        let mut projects = Vec::new();

        loop {
            let offset = projects.len().to_string();
            let page: ProjectsPayload = rpc.get_with_query(
                "/projects.json",
                &[("limit", limit.as_str()), ("offset", offset.as_str())],
                &format!("project list at offset {offset}"),
            )?;
            let fetched = page.projects.len();
            projects.extend(page.projects);

            if fetched == 0 || projects.len() >= page.total_count {
                return Ok(projects);
            }
        }
    }

    pub fn tracker_by_name(&self, project: &RedmineProject, name: &str) -> TrackerResult<NamedRef> {
        let payload: ProjectPayload = self.connect()?.get_with_query(
            &format!("/projects/{}.json", project.id),
            &[("include", "trackers")],
            &format!("trackers of project {}", project.name),
        )?;
        match_or_first(payload.project.trackers, name, |tracker| vec![tracker.name.as_str()]).ok_or(
            TrackerError::EmptyListing {
                vendor: TrackerKind::Redmine,
                what: "trackers",
            },
        )
    }

    pub fn priority_by_name(&self, name: &str) -> TrackerResult<NamedRef> {
        let payload: PrioritiesPayload = self
            .connect()?
            .get("/enumerations/issue_priorities.json", "issue priorities")?;
        match_or_first(payload.issue_priorities, name, |priority| vec![priority.name.as_str()])
            .ok_or(TrackerError::EmptyListing {
                vendor: TrackerKind::Redmine,
                what: "issue priorities",
            })
    }

    /// New issues always start in the first status Redmine lists.
    pub fn initial_status(&self) -> TrackerResult<NamedRef> {
        let payload: StatusesPayload = self
            .connect()?
            .get("/issue_statuses.json", "issue statuses")?;
        payload
            .issue_statuses
            .into_iter()
            .next()
            .ok_or(TrackerError::EmptyListing {
                vendor: TrackerKind::Redmine,
                what: "issue statuses",
            })
    }

    /// Project from the product name, then its tracker, the initial status and the
    /// priority matching the execution's priority label.
    pub fn resolve_target(&self, execution: &ExecutionContext) -> TrackerResult<IssueTarget> {
        let project = self.project_by_name(&execution.product_name)?;
        let tracker = self.tracker_by_name(&project, self.config.tracker_name())?;
        let status = self.initial_status()?;
        let priority = self.priority_by_name(&execution.priority)?;
        debug!(
            tracker = %self.config.name,
            project = %project.name,
            redmine_tracker = %tracker.name,
            priority = %priority.name,
            "resolved Redmine issue target"
        );

        Ok(IssueTarget {
            project,
            tracker,
            status,
            priority,
        })
    }

    fn create_issue(
        &self,
        target: &IssueTarget,
        execution: &ExecutionContext,
        user: &str,
    ) -> TrackerResult<CreatedIssue> {
        let payload = json!({
            "issue": {
                "subject": execution.issue_title(),
                "description": self.services.formatter.render(execution, Some(user), None),
                "project_id": target.project.id,
                "tracker_id": target.tracker.id,
                "status_id": target.status.id,
                "priority_id": target.priority.id,
            }
        });

        let created: IssueEnvelope = self.connect()?.post("/issues.json", &payload, "new issue")?;
        Ok(CreatedIssue {
            id: created.issue.id.to_string(),
            url: format!("{}/issues/{}", self.config.base_url(), created.issue.id),
        })
    }

    fn manual_report_url(
        &self,
        target: Option<&IssueTarget>,
        execution: &ExecutionContext,
        user: &str,
    ) -> String {
        let subject = execution.issue_title();
        let description = self.services.formatter.render(execution, Some(user), None);
        let mut params = vec![
            ("issue[subject]", subject),
            ("issue[description]", description),
        ];

        let path = match target {
            Some(target) => {
                params.push(("issue[tracker_id]", target.tracker.id.to_string()));
                params.push(("issue[priority_id]", target.priority.id.to_string()));
                format!("/projects/{}/issues/new", project_slug(&target.project))
            }
            None => "/issues/new".to_string(),
        };

        let params = params
            .iter()
            .map(|(name, value)| (*name, value.as_str()))
            .collect::<Vec<_>>();
        manual_url(self.config.base_url(), &path, &params)
    }

    fn fetch_details(&self, url: &str) -> TrackerResult<IssueDetails> {
        let id = self.bug_id_from_url(url);
        let envelope: IssueEnvelope = self.connect()?.get(
            &format!("/issues/{}.json", path_segment(&id)),
            &format!("issue #{id}"),
        )?;

        let issue = envelope.issue;
        Ok(IssueDetails {
            id: issue.id.to_string(),
            description: issue.description.unwrap_or_default(),
            status: issue
                .status
                .map(|status| status.name)
                .unwrap_or_else(|| "Unknown".to_string()),
            title: issue.subject,
            url: url.to_string(),
        })
    }
}

impl IssueTracker for RedmineTracker {
    fn kind(&self) -> TrackerKind {
        TrackerKind::Redmine
    }

    fn config(&self) -> &TrackerConfig {
        &self.config
    }

    fn connect(&self) -> TrackerResult<&RpcConnection> {
        memoized_connection(&self.rpc, || {
            let base_url = require(&self.config, self.config.base_url.as_deref(), "base_url")?;
            let secret =
                require(&self.config, self.config.api_password.as_deref(), "api_password")?;

            let auth = match self.config.api_username.as_deref().map(str::trim) {
                Some(user) if !user.is_empty() => AuthMode::Basic {
                    user: user.to_string(),
                    password: secret.to_string(),
                },
                _ => AuthMode::Header {
                    name: "X-Redmine-API-Key",
                    value: secret.to_string(),
                },
            };

            RpcConnection::new(&self.config, base_url, auth)
        })
    }

    fn is_adding_testcase_to_issue_disabled(&self) -> bool {
        self.config.base_url.is_none() || self.config.credentials().secret.is_none()
    }

    fn details(&self, url: &str) -> TrackerResult<IssueDetails> {
        details_or_placeholder(self, url, self.fetch_details(url))
    }

    fn report_issue(&self, execution: &ExecutionContext, user: &str) -> ReportResult {
        let target = match self.resolve_target(execution) {
            Ok(target) => target,
            Err(error) => {
                warn!(
                    tracker = %self.config.name,
                    error = %error,
                    "could not resolve Redmine project, falling back to manual report"
                );
                return ReportResult::manual(self.manual_report_url(None, execution, user));
            }
        };

        match self.create_issue(&target, execution, user) {
            Ok(issue) => {
                info!(tracker = %self.config.name, id = %issue.id, "created Redmine issue");
                self.services.record_defect(execution, &issue.url);
                ReportResult::created(issue)
            }
            Err(error) => {
                warn!(
                    tracker = %self.config.name,
                    error = %error,
                    "Redmine rejected issue, falling back to manual report"
                );
                ReportResult::manual(self.manual_report_url(Some(&target), execution, user))
            }
        }
    }

    fn post_comment(&self, execution: &ExecutionContext, bug_id: &str) -> TrackerResult<()> {
        let notes = self.services.formatter.render(execution, None, None);
        self.connect()?.put(
            &format!("/issues/{}.json", path_segment(bug_id)),
            &json!({"issue": {"notes": notes}}),
            &format!("notes on #{bug_id}"),
        )
    }
}

fn project_slug(project: &RedmineProject) -> String {
    if project.identifier.is_empty() {
        project.id.to_string()
    } else {
        project.identifier.clone()
    }
}
