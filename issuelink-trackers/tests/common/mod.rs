#![allow(dead_code)]

use std::{cell::RefCell, rc::Rc};

use issuelink_domain::{
    ExecutionContext, InMemoryLinkRecorder, MarkdownReportFormatter, ReportFormatter,
};
use issuelink_trackers::TrackerServices;
use url::Url;

/// Markdown formatter that remembers every length cap it was asked for.
#[derive(Default)]
pub struct RecordingFormatter {
    pub limits: RefCell<Vec<Option<usize>>>,
}

impl ReportFormatter for RecordingFormatter {
    fn render(
        &self,
        execution: &ExecutionContext,
        user: Option<&str>,
        max_length: Option<usize>,
    ) -> String {
        self.limits.borrow_mut().push(max_length);
        MarkdownReportFormatter.render(execution, user, max_length)
    }
}

pub struct Harness {
    pub links: Rc<InMemoryLinkRecorder>,
    pub formatter: Rc<RecordingFormatter>,
    pub services: TrackerServices,
}

pub fn harness() -> Harness {
    let links = Rc::new(InMemoryLinkRecorder::new());
    let formatter = Rc::new(RecordingFormatter::default());
    let services = TrackerServices::new(links.clone(), formatter.clone());
    Harness {
        links,
        formatter,
        services,
    }
}

pub fn failed_execution(product: &str) -> ExecutionContext {
    ExecutionContext {
        execution_id: 101,
        run_id: Some(7),
        case_id: Some(42),
        case_summary: "Login fails on Safari".to_string(),
        case_text: "1. Open the login page\n2. Submit valid credentials".to_string(),
        product_name: product.to_string(),
        plan_name: "Release smoke".to_string(),
        priority: "P1".to_string(),
        version: "2.4".to_string(),
        build: "nightly-118".to_string(),
        execution_url: Some("https://tcms.example.com/runs/7/#execution-101".to_string()),
        case_url: Some("https://tcms.example.com/case/42/".to_string()),
    }
}

pub fn query_param(url: &str, name: &str) -> Option<String> {
    Url::parse(url)
        .ok()?
        .query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}
