mod adapter;
mod cli_args;
mod links;
mod telemetry;

use std::rc::Rc;

use anyhow::{Context, Result};
use clap::Parser;
use issuelink_domain::{ExecutionContext, InMemoryLinkRecorder, LinkRecorder};

use crate::{
    cli_args::{Cli, CliCommand},
    links::{default_links_path, FileLinkRecorder},
};

fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init(cli.log_json);

    let config = adapter::load_config(cli.config.as_deref())?;

    // only new issues produce link references worth keeping
    let recorder: Rc<dyn LinkRecorder> = match &cli.command {
        CliCommand::Report { links, .. } => Rc::new(FileLinkRecorder::new(
            links.clone().unwrap_or_else(default_links_path),
        )),
        _ => Rc::new(InMemoryLinkRecorder::new()),
    };
    let tracker = adapter::build_tracker(&config, cli.tracker.as_deref(), recorder)?;

    match cli.command {
        CliCommand::Check => println!("{}", adapter::check(tracker.as_ref())),
        CliCommand::BugId { url } => println!("{}", tracker.bug_id_from_url(&url)),
        CliCommand::Details { url } => {
            let details = tracker
                .details(&url)
                .with_context(|| format!("failed to fetch details for {url}"))?;
            println!("{}", adapter::describe_details(&details));
        }
        CliCommand::Report {
            execution,
            user,
            open,
            ..
        } => {
            let execution = ExecutionContext::from(execution);
            let result = adapter::report(tracker.as_ref(), &execution, &user)?;
            println!("{}", adapter::describe_report(&result));

            if open {
                webbrowser::open(&result.url)
                    .with_context(|| format!("failed to open {}", result.url))?;
            }
        }
        CliCommand::Comment { bug_id, execution } => {
            let execution = ExecutionContext::from(execution);
            adapter::comment(tracker.as_ref(), &execution, &bug_id)
                .with_context(|| format!("failed to comment on {bug_id}"))?;
            println!("commented on {bug_id}");
        }
    }

    Ok(())
}
