use std::io;

use tracing_subscriber::{fmt, EnvFilter};

const LOG_ENV: &str = "ISSUELINK_LOG";
const DEFAULT_DIRECTIVE: &str = "warn";

/// Installs the global subscriber. Logs go to stderr so stdout stays scriptable.
pub fn init(json: bool) {
    let filter = build_filter(std::env::var(LOG_ENV).ok().as_deref());
    let builder = fmt().with_env_filter(filter).with_writer(io::stderr);

    // try_init: a subscriber may already be installed when embedded in tests
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.with_target(false).try_init()
    };
}

fn build_filter(directive: Option<&str>) -> EnvFilter {
    directive
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .and_then(|value| EnvFilter::try_new(value).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_DIRECTIVE))
}

#[cfg(test)]
mod tests {
    use super::build_filter;

    #[test]
    fn falls_back_to_default_directive() {
        assert_eq!(build_filter(None).to_string(), "warn");
        assert_eq!(build_filter(Some("  ")).to_string(), "warn");
    }

    #[test]
    fn honors_custom_directive() {
        assert_eq!(
            build_filter(Some("issuelink_trackers=debug")).to_string(),
            "issuelink_trackers=debug"
        );
    }
}
