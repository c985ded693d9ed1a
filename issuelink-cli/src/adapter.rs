use std::{path::Path, rc::Rc};

use anyhow::{bail, Result};
use issuelink_config::{IssueLinkConfig, TrackerConfig};
use issuelink_domain::{ExecutionContext, IssueDetails, LinkRecorder, ReportResult};
use issuelink_trackers::{IssueTracker, TrackerRegistry, TrackerServices};

pub fn load_config(path: Option<&Path>) -> Result<IssueLinkConfig> {
    match path {
        Some(path) => IssueLinkConfig::load_from_path(path),
        None => IssueLinkConfig::load_default(),
    }
}

pub fn build_tracker(
    config: &IssueLinkConfig,
    tracker_name: Option<&str>,
    links: Rc<dyn LinkRecorder>,
) -> Result<Box<dyn IssueTracker>> {
    let tracker_config: TrackerConfig = config.resolve_tracker(tracker_name)?.clone();
    let services = TrackerServices::with_markdown(links);
    let tracker = TrackerRegistry::with_defaults().build(tracker_config, services)?;
    Ok(tracker)
}

pub fn check(tracker: &dyn IssueTracker) -> String {
    let state = if tracker.is_adding_testcase_to_issue_disabled() {
        "disabled"
    } else {
        "enabled"
    };
    format!("{} ({}): {state}", tracker.config().name, tracker.kind())
}

pub fn report(
    tracker: &dyn IssueTracker,
    execution: &ExecutionContext,
    user: &str,
) -> Result<ReportResult> {
    ensure_enabled(tracker)?;
    Ok(tracker.report_issue(execution, user))
}

pub fn comment(
    tracker: &dyn IssueTracker,
    execution: &ExecutionContext,
    bug_id: &str,
) -> Result<()> {
    ensure_enabled(tracker)?;
    tracker.post_comment(execution, bug_id)?;
    Ok(())
}

pub fn describe_report(result: &ReportResult) -> String {
    if result.is_manual() {
        format!("manual {}", result.url)
    } else {
        format!("created {}", result.url)
    }
}

pub fn describe_details(details: &IssueDetails) -> String {
    let mut out = format!(
        "id: {}\ntitle: {}\nstatus: {}\nurl: {}",
        details.id, details.title, details.status, details.url
    );
    let description = details.description.trim();
    if !description.is_empty() {
        out.push_str("\n\n");
        out.push_str(description);
    }
    out
}

fn ensure_enabled(tracker: &dyn IssueTracker) -> Result<()> {
    if tracker.is_adding_testcase_to_issue_disabled() {
        bail!(
            "tracker '{}' is missing its URL or credentials, see `issuelink check`",
            tracker.config().name
        );
    }
    Ok(())
}
