mod link;
mod report;

pub use link::{InMemoryLinkRecorder, LinkRecorder, LinkReference};
pub use report::{truncate_chars, MarkdownReportFormatter, ReportFormatter};

/// Read-only view of the failed test execution being reported.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecutionContext {
    pub execution_id: u64,
    pub run_id: Option<u64>,
    pub case_id: Option<u64>,
    pub case_summary: String,
    pub case_text: String,
    pub product_name: String,
    pub plan_name: String,
    pub priority: String,
    pub version: String,
    pub build: String,
    pub execution_url: Option<String>,
    pub case_url: Option<String>,
}

impl ExecutionContext {
    pub fn issue_title(&self) -> String {
        format!("Failed test: {}", self.case_summary.trim())
    }
}

/// Vendor issue normalized into the five fields every tracker can provide.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssueDetails {
    pub id: String,
    pub description: String,
    pub status: String,
    pub title: String,
    pub url: String,
}

impl IssueDetails {
    /// Degraded result used when the tracker cannot tell us anything about the issue.
    pub fn placeholder(id: impl Into<String>, url: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            title: format!("Issue {id}"),
            id,
            description: "Details are not available.".to_string(),
            status: "Unknown".to_string(),
            url: url.into(),
        }
    }
}

/// Issue that the tracker confirmed it created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreatedIssue {
    pub id: String,
    pub url: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportResult {
    pub issue: Option<CreatedIssue>,
    pub url: String,
}

impl ReportResult {
    pub fn created(issue: CreatedIssue) -> Self {
        Self {
            url: issue.url.clone(),
            issue: Some(issue),
        }
    }

    /// A pre-filled "new issue" page; nothing exists on the tracker yet.
    pub fn manual(url: impl Into<String>) -> Self {
        Self {
            issue: None,
            url: url.into(),
        }
    }

    pub fn is_manual(&self) -> bool {
        self.issue.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::{CreatedIssue, ExecutionContext, IssueDetails, ReportResult};

    #[test]
    fn issue_title_prefixes_case_summary() {
        let execution = ExecutionContext {
            case_summary: " Login fails on Safari ".to_string(),
            ..ExecutionContext::default()
        };
        assert_eq!(execution.issue_title(), "Failed test: Login fails on Safari");
    }

    #[test]
    fn placeholder_populates_every_field() {
        let details = IssueDetails::placeholder("42", "https://tracker.example.com/issues/42");
        assert_eq!(details.id, "42");
        assert_eq!(details.title, "Issue 42");
        assert_eq!(details.status, "Unknown");
        assert!(!details.description.is_empty());
        assert_eq!(details.url, "https://tracker.example.com/issues/42");
    }

    #[test]
    fn report_result_tracks_manual_fallback() {
        let created = ReportResult::created(CreatedIssue {
            id: "7".to_string(),
            url: "https://tracker.example.com/issues/7".to_string(),
        });
        assert!(!created.is_manual());
        assert_eq!(created.url, "https://tracker.example.com/issues/7");

        let manual = ReportResult::manual("https://tracker.example.com/issues/new?title=x");
        assert!(manual.is_manual());
    }
}
