use hookwise_commands::CommentSection;
use hookwise_core::{EntryStatus, TrackingRecord};

pub const ENTRY_MARKER_PREFIX: &str = "<!-- hookwise-entry:";
pub const ENTRY_MARKER_SUFFIX: &str = " -->";
/// GitHub rejects comment bodies above 65 536 characters.
pub const MAX_COMMENT_CHARS: usize = 65_000;

const TRUNCATION_NOTICE: &str = "\n\n_output truncated_";

pub fn entry_marker(entry_id: &str) -> String {
    format!("{ENTRY_MARKER_PREFIX}{entry_id}{ENTRY_MARKER_SUFFIX}")
}

/// Cuts `text` to at most `max_chars` characters, marking the cut with `...`.
pub(crate) fn clip_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

fn status_label(status: EntryStatus) -> &'static str {
    match status {
        EntryStatus::Pending => "pending",
        EntryStatus::Success => "passed",
        EntryStatus::Failure => "failed",
        EntryStatus::Error => "errored",
    }
}

pub(crate) fn render_footer(record: &TrackingRecord, status: &str) -> String {
    format!(
        "---\n{}\n_hookwise entry `{}` | command `{}` | status `{}` | version `{}` | updated `{}`_",
        entry_marker(&record.id),
        record.id,
        record.command_name,
        status,
        record.version,
        record.updated_at.to_rfc3339(),
    )
}

pub(crate) fn assemble_body(content: String, footer: String) -> String {
    let budget = MAX_COMMENT_CHARS
        .saturating_sub(footer.chars().count())
        .saturating_sub(TRUNCATION_NOTICE.chars().count() + 2);
    let content = if content.chars().count() > budget {
        let mut truncated = content.chars().take(budget).collect::<String>();
        truncated.push_str(TRUNCATION_NOTICE);
        truncated
    } else {
        content
    };
    format!("{content}\n\n{footer}")
}

/// Renders the summary comment for `record` from command-provided sections.
///
/// The body ends with a hidden marker naming the entry, so the comment can be
/// traced back to its record.
/// `headline` replaces the status word in the header when given.
pub fn render_comment(
    record: &TrackingRecord,
    headline: Option<&str>,
    sections: &[CommentSection],
) -> String {
    let mut content = format!(
        "### `{}` {}",
        record.command_name,
        headline.unwrap_or_else(|| status_label(record.status))
    );
    for section in sections {
        let body = section.body.trim();
        match section.heading.as_deref() {
            Some(heading) => {
                content.push_str(&format!("\n\n#### {}\n{}", heading.trim(), body));
            }
            None if !body.is_empty() => {
                content.push_str(&format!("\n\n{body}"));
            }
            None => {}
        }
    }
    if record.status == EntryStatus::Error && sections.is_empty() {
        content.push_str("\n\nThe command reported an internal error.");
    }
    if !record.args.is_empty() {
        content.push_str(&format!(
            "\n\n<sub>args: `{}`</sub>",
            clip_chars(&record.args.join(" "), 300)
        ));
    }
    assemble_body(content, render_footer(record, record.status.as_str()))
}
