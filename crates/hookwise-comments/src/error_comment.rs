use hookwise_core::TrackingRecord;

use crate::comment_render::{assemble_body, clip_chars, render_footer};

/// Renders the comment shown when reconciling `record` failed inside hookwise.
///
/// This is distinct from a command-reported `failure`: the stored status is
/// left as it was and the footer says `internal-error`.
pub fn render_internal_error_comment(record: &TrackingRecord, error_message: &str) -> String {
    let content = format!(
        "### `{}` internal error\n\nhookwise could not evaluate this entry. The last recorded status was `{}`.\n\nError: `{}`",
        record.command_name,
        record.status,
        clip_chars(error_message.trim(), 600)
    );
    assemble_body(content, render_footer(record, "internal-error"))
}
