use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use issuelink_domain::ExecutionContext;

#[derive(Debug, Parser)]
#[command(name = "issuelink", version, about = "Report failed test executions to issue trackers")]
pub struct Cli {
    /// Config file, defaults to ~/.config/issuelink/config.yaml
    #[arg(long, global = true, env = "ISSUELINK_CONFIG_FILE")]
    pub config: Option<PathBuf>,

    /// Name of the configured tracker to use
    #[arg(long, short = 't', global = true)]
    pub tracker: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Tell whether the tracker has enough configuration to report issues
    Check,
    /// Print the tracker-native issue id contained in a bug URL
    BugId { url: String },
    /// Fetch title, status and description of an issue
    Details { url: String },
    /// File a new issue for a failed execution
    Report {
        #[command(flatten)]
        execution: ExecutionArgs,

        /// Name of the person reporting
        #[arg(long, env = "USER", default_value = "issuelink")]
        user: String,

        /// Open the resulting URL in the browser
        #[arg(long)]
        open: bool,

        /// JSON-lines file storing execution to bug links
        #[arg(long)]
        links: Option<PathBuf>,
    },
    /// Add the execution report as a comment on an existing issue
    Comment {
        bug_id: String,

        #[command(flatten)]
        execution: ExecutionArgs,
    },
}

#[derive(Debug, Args)]
pub struct ExecutionArgs {
    #[arg(long)]
    pub execution_id: u64,
    #[arg(long)]
    pub run_id: Option<u64>,
    #[arg(long)]
    pub case_id: Option<u64>,
    #[arg(long)]
    pub summary: String,
    #[arg(long, default_value = "")]
    pub text: String,
    #[arg(long, default_value = "")]
    pub product: String,
    #[arg(long, default_value = "")]
    pub plan: String,
    #[arg(long, default_value = "")]
    pub priority: String,
    #[arg(long, default_value = "")]
    pub version: String,
    #[arg(long, default_value = "")]
    pub build: String,
    #[arg(long)]
    pub execution_url: Option<String>,
    #[arg(long)]
    pub case_url: Option<String>,
}

impl From<ExecutionArgs> for ExecutionContext {
    fn from(args: ExecutionArgs) -> Self {
        Self {
            execution_id: args.execution_id,
            run_id: args.run_id,
            case_id: args.case_id,
            case_summary: args.summary,
            case_text: args.text,
            product_name: args.product,
            plan_name: args.plan,
            priority: args.priority,
            version: args.version,
            build: args.build,
            execution_url: args.execution_url,
            case_url: args.case_url,
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use issuelink_domain::ExecutionContext;

    use super::{Cli, CliCommand};

    #[test]
    fn parses_report_with_execution_flags() {
        let cli = Cli::try_parse_from([
            "issuelink",
            "--tracker",
            "upstream",
            "report",
            "--execution-id",
            "101",
            "--summary",
            "Login fails on Safari",
            "--product",
            "Kiwi",
            "--user",
            "alice",
            "--open",
        ])
        .expect("cli");

        assert_eq!(cli.tracker.as_deref(), Some("upstream"));
        let CliCommand::Report {
            execution,
            user,
            open,
            links,
        } = cli.command
        else {
            panic!("expected report command");
        };

        assert_eq!(user, "alice");
        assert!(open);
        assert!(links.is_none());

        let execution = ExecutionContext::from(execution);
        assert_eq!(execution.execution_id, 101);
        assert_eq!(execution.case_summary, "Login fails on Safari");
        assert_eq!(execution.product_name, "Kiwi");
        assert_eq!(execution.priority, "");
    }

    #[test]
    fn global_flags_follow_subcommand() {
        let cli = Cli::try_parse_from([
            "issuelink",
            "details",
            "https://github.com/kiwitcms/tcms/issues/1",
            "--log-json",
        ])
        .expect("cli");

        assert!(cli.log_json);
        assert!(matches!(cli.command, CliCommand::Details { .. }));
    }

    #[test]
    fn comment_requires_execution_id() {
        let error = Cli::try_parse_from(["issuelink", "comment", "KIWI-7", "--summary", "x"])
            .expect_err("expected missing argument");
        assert!(error.to_string().contains("--execution-id"));
    }
}
