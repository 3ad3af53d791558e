//! Incremental parsing of assistant text.
//!
//! Assistant replies embed `<boltArtifact ...>...</boltArtifact>` blocks that
//! carry file contents and shell actions. Users see a one-line placeholder in
//! place of each block. The parser keeps a cursor per message so a growing
//! message is only scanned from where the previous call stopped.

use std::collections::HashMap;

const ARTIFACT_OPEN: &str = "<boltArtifact";
const ARTIFACT_CLOSE: &str = "</boltArtifact>";

#[derive(Debug, Default)]
struct ParserState {
    position: usize,
    output: String,
    in_artifact: bool,
}

/// Derives the parsed projection of assistant messages.
#[derive(Debug, Default)]
pub struct MessageParser {
    states: HashMap<String, ParserState>,
}

impl MessageParser {
    /// Create an empty parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the full raw text of message `message_id`.
    ///
    /// `input` must extend whatever was passed for the same id last time. A
    /// shorter input restarts parsing from scratch. A trailing tag that is not
    /// yet complete is withheld from the output until it is.
    pub fn parse(&mut self, message_id: &str, input: &str) -> &str {
        let state = self.states.entry(message_id.to_string()).or_default();
        if input.len() < state.position {
            *state = ParserState::default();
        }

        loop {
            let rest = &input[state.position..];
            if state.in_artifact {
                match rest.find(ARTIFACT_CLOSE) {
                    Some(end) => {
                        state.position += end + ARTIFACT_CLOSE.len();
                        state.in_artifact = false;
                    }
                    None => break,
                }
                continue;
            }

            match rest.find(ARTIFACT_OPEN) {
                Some(start) => {
                    state.output.push_str(&rest[..start]);
                    state.position += start;
                    let tag = &input[state.position..];
                    let Some(tag_end) = tag.find('>') else {
                        break;
                    };
                    let tag = &tag[..tag_end];
                    let id = attribute(tag, "id").unwrap_or_default();
                    let title = attribute(tag, "title").unwrap_or_default();
                    state.output.push_str(&format!("[artifact {id}: {title}]"));
                    state.position += tag_end + 1;
                    state.in_artifact = true;
                }
                None => {
                    let keep = partial_open_tag(rest);
                    state.output.push_str(&rest[..rest.len() - keep]);
                    state.position += rest.len() - keep;
                    break;
                }
            }
        }

        &state.output
    }

    /// Forget the state of one message.
    pub fn remove(&mut self, message_id: &str) {
        self.states.remove(message_id);
    }

    /// Forget every message.
    pub fn reset(&mut self) {
        self.states.clear();
    }
}

/// Length of the suffix of `text` that could still grow into an opening tag.
fn partial_open_tag(text: &str) -> usize {
    match text.rfind('<') {
        Some(idx) if ARTIFACT_OPEN.starts_with(&text[idx..]) => text.len() - idx,
        _ => 0,
    }
}

fn attribute<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let needle = format!(" {name}=\"");
    let start = tag.find(&needle)? + needle.len();
    let len = tag[start..].find('"')?;
    Some(&tag[start..start + len])
}
