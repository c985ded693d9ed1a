pub mod github;
pub mod gitlab;
pub mod jira;
pub mod redmine;

pub use github::GitHubTracker;
pub use gitlab::GitLabTracker;
pub use jira::JiraTracker;
pub use redmine::RedmineTracker;
