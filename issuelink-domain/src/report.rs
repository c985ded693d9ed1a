use crate::ExecutionContext;

/// Renders an execution as the text posted to a tracker.
pub trait ReportFormatter {
    /// `user` is the reporter for new issues and `None` for follow-up comments.
    fn render(
        &self,
        execution: &ExecutionContext,
        user: Option<&str>,
        max_length: Option<usize>,
    ) -> String;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct MarkdownReportFormatter;

impl ReportFormatter for MarkdownReportFormatter {
    fn render(
        &self,
        execution: &ExecutionContext,
        user: Option<&str>,
        max_length: Option<usize>,
    ) -> String {
        let execution_ref = execution
            .execution_url
            .clone()
            .unwrap_or_else(|| format!("TE-{}", execution.execution_id));
        let case_ref = match (&execution.case_url, execution.case_id) {
            (Some(url), _) => url.clone(),
            (None, Some(id)) => format!("TC-{id}"),
            (None, None) => "-".to_string(),
        };

        let mut lines = Vec::new();
        if user.is_some() {
            lines.push(format!("Filed from execution {execution_ref}"));
        } else {
            lines.push(format!("Confirmed via test execution {execution_ref}"));
        }
        lines.push(String::new());
        push_field(&mut lines, "Product", &execution.product_name);
        push_field(&mut lines, "Test plan", &execution.plan_name);
        push_field(&mut lines, "Version", &execution.version);
        push_field(&mut lines, "Build", &execution.build);
        push_field(&mut lines, "Priority", &execution.priority);
        if let Some(run_id) = execution.run_id {
            lines.push(format!("**Test run:** TR-{run_id}"));
        }
        lines.push(format!(
            "**Test case:** {case_ref}: {}",
            execution.case_summary.trim()
        ));
        if let Some(user) = user.filter(|value| !value.trim().is_empty()) {
            lines.push(format!("**Reported by:** {}", user.trim()));
        }

        let steps = execution.case_text.trim();
        if !steps.is_empty() {
            lines.push(String::new());
            lines.push("**Steps to reproduce:**".to_string());
            lines.push(String::new());
            lines.push(steps.to_string());
        }

        let text = lines.join("\n");
        match max_length {
            Some(limit) => truncate_chars(&text, limit),
            None => text,
        }
    }
}

fn push_field(lines: &mut Vec<String>, label: &str, value: &str) {
    let value = value.trim();
    if !value.is_empty() {
        lines.push(format!("**{label}:** {value}"));
    }
}

/// Keeps at most `limit` characters, never splitting a code point.
pub fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((end, _)) => text[..end].to_string(),
        None => text.to_string(),
    }
}
