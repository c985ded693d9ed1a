mod common;

use issuelink_config::{TrackerConfig, TrackerKind};
use issuelink_trackers::{adapters::GitHubTracker, IssueTracker, TrackerServices};
use mockito::{Matcher, Server};
use serde_json::json;

use common::{failed_execution, harness, query_param};

const REPO_URL: &str = "https://github.com/kiwitcms/test-repo";

fn github(api_url: &str, services: TrackerServices) -> GitHubTracker {
    let mut config = TrackerConfig::new("github", TrackerKind::GitHub);
    config.base_url = Some(REPO_URL.to_string());
    config.api_url = Some(api_url.to_string());
    config.api_password = Some("ghp_token".to_string());
    GitHubTracker::new(config, services)
}

fn issue_body(number: u64) -> String {
    json!({
        "number": number,
        "title": "Failed test: Login fails on Safari",
        "body": "Filed from execution",
        "state": "open",
        "html_url": format!("{REPO_URL}/issues/{number}")
    })
    .to_string()
}

#[test]
fn creates_issue_and_records_link_once() {
    let mut server = Server::new();
    let create = server
        .mock("POST", "/repos/kiwitcms/test-repo/issues")
        .match_header("authorization", "Bearer ghp_token")
        .match_body(Matcher::PartialJson(json!({
            "title": "Failed test: Login fails on Safari"
        })))
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(issue_body(12))
        .create();

    let harness = harness();
    let tracker = github(&server.url(), harness.services.clone());
    let result = tracker.report_issue(&failed_execution("Kiwi"), "alice");

    assert!(!result.is_manual());
    assert_eq!(result.url, format!("{REPO_URL}/issues/12"));

    let links = harness.links.links();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].url, format!("{REPO_URL}/issues/12"));
    assert!(links[0].is_defect);
    create.assert();
}

#[test]
fn unreachable_api_returns_prefilled_new_issue_url() {
    let harness = harness();
    let tracker = github("http://127.0.0.1:1", harness.services.clone());
    let result = tracker.report_issue(&failed_execution("Kiwi"), "alice");

    assert!(result.issue.is_none());
    assert!(result.url.starts_with(&format!(
        "{REPO_URL}/issues/new?title=Failed+test%3A+Login+fails+on+Safari&body="
    )));
    let body = query_param(&result.url, "body").expect("body");
    assert!(body.contains("**Reported by:** alice"));
    assert!(harness.links.links().is_empty());
}

#[test]
fn rejected_create_falls_back_without_recording() {
    let mut server = Server::new();
    let _mock = server
        .mock("POST", "/repos/kiwitcms/test-repo/issues")
        .with_status(410)
        .with_body(r#"{"message": "Issues are disabled for this repo"}"#)
        .create();

    let harness = harness();
    let tracker = github(&server.url(), harness.services.clone());
    let result = tracker.report_issue(&failed_execution("Kiwi"), "alice");

    assert!(result.is_manual());
    assert!(harness.links.links().is_empty());
}

#[test]
fn bug_id_round_trips_through_details() {
    let mut server = Server::new();
    let _mock = server
        .mock("GET", "/repos/kiwitcms/test-repo/issues/12")
        .with_header("content-type", "application/json")
        .with_body(issue_body(12))
        .create();

    let harness = harness();
    let tracker = github(&server.url(), harness.services);
    let url = format!("{REPO_URL}/issues/12");
    assert_eq!(tracker.bug_id_from_url(&url), "12");

    let details = tracker.details(&url).expect("details");
    assert_eq!(details.id, "12");
    assert_eq!(details.status, "open");
    assert_eq!(details.title, "Failed test: Login fails on Safari");
    assert_eq!(details.description, "Filed from execution");
}

#[test]
fn details_of_missing_issue_is_placeholder() {
    let mut server = Server::new();
    let _mock = server
        .mock("GET", "/repos/kiwitcms/test-repo/issues/999")
        .with_status(404)
        .with_body(r#"{"message": "Not Found"}"#)
        .create();

    let harness = harness();
    let tracker = github(&server.url(), harness.services);
    let details = tracker
        .details(&format!("{REPO_URL}/issues/999"))
        .expect("placeholder");

    assert_eq!(details.id, "999");
    assert_eq!(details.status, "Unknown");
}

#[test]
fn comment_fetches_issue_then_posts() {
    let mut server = Server::new();
    let fetch = server
        .mock("GET", "/repos/kiwitcms/test-repo/issues/12")
        .with_header("content-type", "application/json")
        .with_body(issue_body(12))
        .create();
    let post = server
        .mock("POST", "/repos/kiwitcms/test-repo/issues/12/comments")
        .match_body(Matcher::Regex("Confirmed via test execution".to_string()))
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id": 1}"#)
        .create();

    let harness = harness();
    let tracker = github(&server.url(), harness.services);
    tracker
        .post_comment(&failed_execution("Kiwi"), "12")
        .expect("comment");

    fetch.assert();
    post.assert();
}

#[test]
fn oversized_comment_rejection_propagates() {
    let mut server = Server::new();
    let _issue = server
        .mock("GET", "/repos/kiwitcms/test-repo/issues/12")
        .with_header("content-type", "application/json")
        .with_body(issue_body(12))
        .create();
    let _comment = server
        .mock("POST", "/repos/kiwitcms/test-repo/issues/12/comments")
        .with_status(422)
        .with_body(r#"{"message": "Body is too long"}"#)
        .create();

    let harness = harness();
    let tracker = github(&server.url(), harness.services);
    let error = tracker
        .post_comment(&failed_execution("Kiwi"), "12")
        .expect_err("expected rejection");
    assert!(error.to_string().contains("status=422"));
}

#[test]
fn fallback_for_clone_url_points_at_repository_page() {
    let harness = harness();
    let mut config = TrackerConfig::new("github", TrackerKind::GitHub);
    config.base_url = Some(format!("{REPO_URL}.git"));
    config.api_url = Some("http://127.0.0.1:1".to_string());
    config.api_password = Some("ghp_token".to_string());
    let tracker = GitHubTracker::new(config, harness.services);

    let result = tracker.report_issue(&failed_execution("Kiwi"), "alice");

    assert!(result.is_manual());
    assert!(result.url.starts_with(&format!("{REPO_URL}/issues/new?title=")));
}

#[test]
fn comment_bug_id_stays_inside_issue_path() {
    let mut server = Server::new();
    let fetch = server
        .mock(
            "GET",
            Matcher::Regex(r"^/repos/kiwitcms/test-repo/issues/12%2Fcomments$".to_string()),
        )
        .with_status(404)
        .create();

    let harness = harness();
    let tracker = github(&server.url(), harness.services);
    let error = tracker
        .post_comment(&failed_execution("Kiwi"), "12/comments")
        .expect_err("expected missing issue");

    assert!(error.is_not_found());
    fetch.assert();
}
