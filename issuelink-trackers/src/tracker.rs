use std::{cell::OnceCell, rc::Rc};

use issuelink_config::{TrackerConfig, TrackerKind};
use issuelink_domain::{
    ExecutionContext, IssueDetails, LinkRecorder, MarkdownReportFormatter, ReportFormatter,
    ReportResult,
};
use tracing::{debug, warn};
use url::form_urlencoded;

use crate::{
    error::{TrackerError, TrackerResult},
    rpc::RpcConnection,
};

/// Collaborators every adapter needs besides its own configuration.
#[derive(Clone)]
pub struct TrackerServices {
    pub links: Rc<dyn LinkRecorder>,
    pub formatter: Rc<dyn ReportFormatter>,
}

impl TrackerServices {
    pub fn new(links: Rc<dyn LinkRecorder>, formatter: Rc<dyn ReportFormatter>) -> Self {
        Self { links, formatter }
    }

    pub fn with_markdown(links: Rc<dyn LinkRecorder>) -> Self {
        Self::new(links, Rc::new(MarkdownReportFormatter))
    }

    pub(crate) fn record_defect(&self, execution: &ExecutionContext, url: &str) {
        if let Err(error) = self.links.get_or_create(execution, url, true) {
            warn!(
                execution_id = execution.execution_id,
                url,
                error = %error,
                "failed to record link reference"
            );
        }
    }
}

/// The capability set shared by every issue tracker integration.
pub trait IssueTracker {
    fn kind(&self) -> TrackerKind;

    fn config(&self) -> &TrackerConfig;

    /// Returns the authenticated connection, creating it on first use.
    fn connect(&self) -> TrackerResult<&RpcConnection>;

    /// True when the configuration lacks the URL or credentials needed to talk to the tracker.
    fn is_adding_testcase_to_issue_disabled(&self) -> bool;

    fn bug_id_from_url(&self, url: &str) -> String {
        last_url_segment(url)
    }

    fn details(&self, url: &str) -> TrackerResult<IssueDetails>;

    /// Files a new issue for `execution`. Never fails: when the tracker refuses, the result
    /// carries a pre-filled manual creation URL instead of an issue handle.
    fn report_issue(&self, execution: &ExecutionContext, user: &str) -> ReportResult;

    fn post_comment(&self, execution: &ExecutionContext, bug_id: &str) -> TrackerResult<()>;
}

pub fn details_or_placeholder<T>(
    tracker: &T,
    url: &str,
    result: TrackerResult<IssueDetails>,
) -> TrackerResult<IssueDetails>
where
    T: IssueTracker + ?Sized,
{
    match result {
        Err(error) if error.is_not_found() => {
            debug!(
                tracker = %tracker.config().name,
                url,
                "issue not found, using placeholder details"
            );
            Ok(IssueDetails::placeholder(tracker.bug_id_from_url(url), url))
        }
        other => other,
    }
}

pub(crate) fn memoized_connection<F>(
    cell: &OnceCell<RpcConnection>,
    build: F,
) -> TrackerResult<&RpcConnection>
where
    F: FnOnce() -> TrackerResult<RpcConnection>,
{
    if let Some(connection) = cell.get() {
        return Ok(connection);
    }
    let connection = build()?;
    Ok(cell.get_or_init(|| connection))
}

pub(crate) fn require<'a>(
    config: &'a TrackerConfig,
    value: Option<&'a str>,
    field: &str,
) -> TrackerResult<&'a str> {
    value
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| TrackerError::Configuration {
            vendor: config.kind,
            reason: format!("{field} is empty"),
        })
}

pub fn last_url_segment(url: &str) -> String {
    let trimmed = url.trim();
    let path = trimmed.split(['?', '#']).next().unwrap_or(trimmed);
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

pub fn numeric_url_segment(url: &str) -> String {
    let trimmed = url.trim();
    let path = trimmed.split(['?', '#']).next().unwrap_or(trimmed);
    path.rsplit('/')
        .find(|segment| !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()))
        .map(str::to_string)
        .unwrap_or_else(|| last_url_segment(url))
}

// ids come from caller URLs, keep them inside a single path segment
pub(crate) fn path_segment(value: &str) -> String {
    form_urlencoded::byte_serialize(value.trim().as_bytes()).collect()
}

pub fn manual_url(base: &str, path: &str, params: &[(&str, &str)]) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .finish();
    format!("{}{}?{}", base.trim_end_matches('/'), path, query)
}

pub fn match_or_first<T, F>(items: Vec<T>, wanted: &str, names: F) -> Option<T>
where
    F: Fn(&T) -> Vec<&str>,
{
    let wanted = wanted.trim().to_lowercase();
    let position = items
        .iter()
        .position(|item| {
            names(item)
                .into_iter()
                .any(|name| name.trim().to_lowercase() == wanted)
        })
        .unwrap_or(0);
    items.into_iter().nth(position)
}
