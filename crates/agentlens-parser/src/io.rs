use std::path::Path;

use agentlens_types::ParsedMessage;

use crate::Result;
use crate::parser::parse_line;

/// Parse a whole transcript file into its message sequence.
///
/// This is the batch-shaped entry point the session loaders use; the live
/// path goes through the watcher, which feeds the same [`parse_line`].
pub fn read_transcript(path: &Path) -> Result<Vec<ParsedMessage>> {
    let text = std::fs::read_to_string(path)?;
    Ok(parse_text(&text))
}

/// Parse already-loaded transcript text. Blank lines are skipped and do not
/// consume a line index.
pub fn parse_text(text: &str) -> Vec<ParsedMessage> {
    let mut messages = Vec::new();
    let mut line_index = 0;

    for line in text.lines() {
        if let Some(message) = parse_line(line, line_index) {
            messages.push(message);
            line_index += 1;
        }
    }

    messages
}
