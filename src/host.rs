//! Collaborators a session needs from its host environment.
//!
//! The session never touches the workspace, navigation, or history storage
//! directly; it calls these traits. Null implementations are provided for
//! hosts that lack a capability.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};

use serde::{Deserialize, Serialize};
use serde_json::{Value, from_reader, to_writer_pretty};
use utf8path::Path;

use crate::types::Message;
use crate::{Error, Result};

/// The workspace that applies assistant actions to project files.
#[async_trait::async_trait]
pub trait Workspace: Send + Sync {
    /// Files the user changed since the last reset, keyed by path.
    fn modified_files(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    /// Forget tracked modifications.
    fn reset_file_modifications(&self) {}

    /// Stop every long-running action started for the current turn.
    fn abort_all_actions(&self) {}

    /// Snapshot of project files to send along with a request.
    fn files(&self) -> Option<Value> {
        None
    }

    /// Export the project and return the export's file name.
    async fn export(&self) -> Result<Option<String>> {
        Ok(None)
    }
}

/// A workspace that has no files and runs no actions.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullWorkspace;

impl Workspace for NullWorkspace {}

/// Performs a hard navigation reset of the host.
pub trait Navigator: Send + Sync {
    /// Navigate to `location`, discarding the current view.
    fn reset(&self, location: &str);
}

/// A navigator that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNavigator;

impl Navigator for NullNavigator {
    fn reset(&self, location: &str) {
        tracing::info!(component = "navigator", action = "reset", location, "reset ignored");
    }
}

/// Persists the full message history.
pub trait HistoryStore: Send + Sync {
    /// Store `messages`, replacing whatever was stored before.
    fn store_message_history(&self, messages: &[Message]) -> Result<()>;
}

/// A history store that keeps nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHistoryStore;

impl HistoryStore for NullHistoryStore {
    fn store_message_history(&self, _: &[Message]) -> Result<()> {
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct TranscriptFile {
    version: u8,
    messages: Vec<Message>,
}

/// History persisted as a JSON transcript file.
#[derive(Clone)]
pub struct TranscriptStore {
    path: Path<'static>,
}

impl TranscriptStore {
    /// Store transcripts at `path`.
    pub fn new(path: impl Into<String>) -> Self {
        let path: String = path.into();
        Self {
            path: Path::from(path.as_str()).into_owned(),
        }
    }

    /// Where the transcript lives.
    pub fn path(&self) -> &str {
        self.path.as_str()
    }

    /// Load the stored messages; a missing file is an empty history.
    pub fn load(&self) -> Result<Vec<Message>> {
        let file = match File::open(self.path.as_str()) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(Error::io("failed to open transcript file", err)),
        };
        let transcript: TranscriptFile = from_reader(BufReader::new(file)).map_err(|err| {
            Error::serialization("failed to parse transcript", Some(Box::new(err)))
        })?;
        Ok(transcript.messages)
    }
}

impl HistoryStore for TranscriptStore {
    fn store_message_history(&self, messages: &[Message]) -> Result<()> {
        let transcript = TranscriptFile {
            version: 1,
            messages: messages.to_vec(),
        };
        let file = File::create(self.path.as_str())
            .map_err(|err| Error::io("failed to create transcript file", err))?;
        to_writer_pretty(BufWriter::new(file), &transcript).map_err(|err| {
            Error::serialization("failed to serialize transcript", Some(Box::new(err)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> String {
        let dir = std::env::temp_dir();
        format!(
            "{}/chatloop-{name}-{}.json",
            dir.display(),
            std::process::id()
        )
    }

    #[test]
    fn transcript_round_trip() {
        let store = TranscriptStore::new(scratch("transcript"));
        let messages = vec![
            Message::user("1", "hi"),
            Message::assistant("2", "hello").with_annotation("hidden"),
        ];
        store.store_message_history(&messages).unwrap();
        assert_eq!(store.load().unwrap(), messages);
        std::fs::remove_file(store.path()).unwrap();
    }

    #[test]
    fn missing_transcript_is_empty() {
        let store = TranscriptStore::new(scratch("missing"));
        assert!(store.load().unwrap().is_empty());
    }

    #[tokio::test]
    async fn null_workspace_has_nothing() {
        let workspace = NullWorkspace;
        assert!(workspace.modified_files().is_empty());
        assert!(workspace.files().is_none());
        assert_eq!(workspace.export().await.unwrap(), None);
    }
}
