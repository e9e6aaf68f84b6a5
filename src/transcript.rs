//! Plain-text transcript of a ticket channel.

use crate::platform::HistoryMessage;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Render one line per message, in the order given (oldest first).
///
/// Embeds and attachments are kept as inline markers after the text
/// content: `[Embed: title]`, `[Attachment: filename]`.
pub fn render_transcript(messages: &[HistoryMessage]) -> String {
    messages
        .iter()
        .map(render_line)
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_line(message: &HistoryMessage) -> String {
    let mut content = message.content.clone();
    for title in &message.embed_titles {
        content.push_str(&format!("\n[Embed: {title}]"));
    }
    for filename in &message.attachment_names {
        content.push_str(&format!("\n[Attachment: {filename}]"));
    }
    // Keep one line per message
    let content = content.replace('\n', " ");

    format!(
        "[{}] {}: {}",
        message.timestamp.format(TIMESTAMP_FORMAT),
        message.author,
        content.trim_start()
    )
}

pub fn transcript_filename(channel_name: &str) -> String {
    format!("transcript-{channel_name}.txt")
}
