//! Append-only chat history
//!
//! `JsonlMessageLog` keeps one JSON document per line so an append never
//! rewrites earlier history; the whole log is mirrored in memory for `tail`.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::core::error::StoreError;
use crate::core::models::ChatEvent;

/// Ordered, append-only record of chat events.
#[async_trait]
pub trait MessageLog: Send + Sync {
    /// Append an event. Call order is persisted order.
    async fn append(&self, event: ChatEvent) -> Result<(), StoreError>;

    /// Last `n` events in append order.
    async fn tail(&self, n: usize) -> Result<Vec<ChatEvent>, StoreError>;

    async fn len(&self) -> Result<usize, StoreError>;

    async fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len().await? == 0)
    }
}

fn last_n(events: &[ChatEvent], n: usize) -> Vec<ChatEvent> {
    events[events.len().saturating_sub(n)..].to_vec()
}

/// In-process log, lost on restart.
#[derive(Default)]
pub struct MemoryMessageLog {
    events: Mutex<Vec<ChatEvent>>,
}

impl MemoryMessageLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageLog for MemoryMessageLog {
    async fn append(&self, event: ChatEvent) -> Result<(), StoreError> {
        self.events.lock().push(event);
        Ok(())
    }

    async fn tail(&self, n: usize) -> Result<Vec<ChatEvent>, StoreError> {
        Ok(last_n(&self.events.lock(), n))
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.events.lock().len())
    }
}

struct LogFile {
    file: File,
    /// File length after the last complete line
    len: u64,
    /// A failed append left a fragment that could not be cut off
    torn: bool,
    events: Vec<ChatEvent>,
}

impl LogFile {
    /// Drop whatever a failed append left behind. If the file cannot be cut
    /// back, the next append starts on a fresh line instead.
    async fn repair(&mut self) {
        match self.file.set_len(self.len).await {
            Ok(()) => self.torn = false,
            Err(e) => {
                warn!("[MessageLog] Could not truncate partial append: {}", e);
                self.torn = true;
            }
        }
    }
}

/// JSON-Lines file backed log.
pub struct JsonlMessageLog {
    path: PathBuf,
    inner: tokio::sync::Mutex<LogFile>,
}

impl JsonlMessageLog {
    /// Open (or create) the log at `path`, loading existing history.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let (events, needs_newline) = Self::load(&path).await?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        // Terminate a line torn by a crash so the next append starts clean.
        if needs_newline {
            file.write_all(b"\n").await?;
            file.flush().await?;
        }
        let len = file.metadata().await?.len();

        info!("[MessageLog] Loaded {} events from {:?}", events.len(), path);

        Ok(Self {
            path,
            inner: tokio::sync::Mutex::new(LogFile {
                file,
                len,
                torn: false,
                events,
            }),
        })
    }

    async fn load(path: &Path) -> Result<(Vec<ChatEvent>, bool), StoreError> {
        let content = match fs::read(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((Vec::new(), false)),
            Err(e) => return Err(e.into()),
        };

        let mut events = Vec::new();
        for (lineno, line) in content.split(|b| *b == b'\n').enumerate() {
            // A crash can cut a line inside a multi-byte character.
            let line = match std::str::from_utf8(line) {
                Ok(line) => line,
                Err(e) => {
                    warn!(
                        "[MessageLog] Skipping non UTF-8 line {} in {:?}: {}",
                        lineno + 1,
                        path,
                        e
                    );
                    continue;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ChatEvent>(line) {
                Ok(event) => events.push(event),
                Err(e) => warn!(
                    "[MessageLog] Skipping malformed line {} in {:?}: {}",
                    lineno + 1,
                    path,
                    e
                ),
            }
        }

        let needs_newline = content.last().is_some_and(|b| *b != b'\n');
        Ok((events, needs_newline))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl MessageLog for JsonlMessageLog {
    async fn append(&self, event: ChatEvent) -> Result<(), StoreError> {
        let mut line = serde_json::to_string(&event)?;
        line.push('\n');

        let mut log = self.inner.lock().await;
        if log.torn {
            // The fragment stays, so the clean length is wherever the file ends now.
            log.len = log.file.metadata().await?.len();
            line.insert(0, '\n');
        }

        let written = async {
            log.file.write_all(line.as_bytes()).await?;
            log.file.flush().await
        }
        .await;
        if let Err(e) = written {
            log.repair().await;
            return Err(e.into());
        }

        log.len += line.len() as u64;
        log.torn = false;
        // Only visible to readers once it is on disk.
        log.events.push(event);
        Ok(())
    }

    async fn tail(&self, n: usize) -> Result<Vec<ChatEvent>, StoreError> {
        let log = self.inner.lock().await;
        Ok(last_n(&log.events, n))
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.inner.lock().await.events.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::TextMessage;
    use tempfile::TempDir;

    fn text(body: &str) -> ChatEvent {
        ChatEvent::Text(TextMessage::new("alice", body))
    }

    fn bodies(events: &[ChatEvent]) -> Vec<String> {
        events
            .iter()
            .map(|e| match e {
                ChatEvent::Text(m) => m.message.clone(),
                ChatEvent::File(f) => f.original_name.clone(),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_tail_returns_last_n_in_append_order() {
        let log = MemoryMessageLog::new();
        for i in 0..5 {
            log.append(text(&format!("m{i}"))).await.unwrap();
        }

        assert_eq!(bodies(&log.tail(3).await.unwrap()), ["m2", "m3", "m4"]);
        assert_eq!(log.tail(50).await.unwrap().len(), 5);
        assert!(log.tail(0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_log() {
        let log = MemoryMessageLog::new();
        assert!(log.is_empty().await.unwrap());
        assert!(log.tail(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_jsonl_log_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("messages.jsonl");

        {
            let log = JsonlMessageLog::open(&path).await.unwrap();
            log.append(text("first")).await.unwrap();
            log.append(text("second")).await.unwrap();
        }

        let log = JsonlMessageLog::open(&path).await.unwrap();
        assert_eq!(log.len().await.unwrap(), 2);
        assert_eq!(bodies(&log.tail(10).await.unwrap()), ["first", "second"]);
    }

    #[tokio::test]
    async fn test_jsonl_log_skips_malformed_and_torn_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("messages.jsonl");

        let good = serde_json::to_string(&text("kept")).unwrap();
        std::fs::write(&path, format!("{good}\nnot json\n{{\"type\":\"text\",\"user")).unwrap();

        let log = JsonlMessageLog::open(&path).await.unwrap();
        assert_eq!(bodies(&log.tail(10).await.unwrap()), ["kept"]);

        log.append(text("after crash")).await.unwrap();
        drop(log);

        let log = JsonlMessageLog::open(&path).await.unwrap();
        assert_eq!(bodies(&log.tail(10).await.unwrap()), ["kept", "after crash"]);
    }

    #[tokio::test]
    async fn test_jsonl_log_skips_line_cut_inside_a_character() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("messages.jsonl");

        let good = serde_json::to_string(&text("kept 😀")).unwrap();
        let mut raw = format!("{good}\n{{\"type\":\"text\",\"username\":\"alice\",\"message\":\"hi ").into_bytes();
        raw.extend_from_slice(&"😀".as_bytes()[..2]);
        std::fs::write(&path, raw).unwrap();

        let log = JsonlMessageLog::open(&path).await.unwrap();
        assert_eq!(bodies(&log.tail(10).await.unwrap()), ["kept 😀"]);

        log.append(text("after crash")).await.unwrap();
        drop(log);

        let log = JsonlMessageLog::open(&path).await.unwrap();
        assert_eq!(bodies(&log.tail(10).await.unwrap()), ["kept 😀", "after crash"]);
    }

    fn append_fragment(path: &Path) {
        use std::io::Write;
        let mut file = std::fs::OpenOptions::new().append(true).open(path).unwrap();
        file.write_all(b"{\"type\":\"text\",\"user").unwrap();
    }

    #[tokio::test]
    async fn test_failed_append_is_truncated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("messages.jsonl");

        let log = JsonlMessageLog::open(&path).await.unwrap();
        log.append(text("first")).await.unwrap();
        let clean_len = std::fs::metadata(&path).unwrap().len();

        // State after a write that failed halfway.
        append_fragment(&path);
        log.inner.lock().await.repair().await;
        assert_eq!(std::fs::metadata(&path).unwrap().len(), clean_len);

        log.append(text("second")).await.unwrap();
        drop(log);

        let log = JsonlMessageLog::open(&path).await.unwrap();
        assert_eq!(bodies(&log.tail(10).await.unwrap()), ["first", "second"]);
    }

    #[tokio::test]
    async fn test_torn_append_starts_on_fresh_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("messages.jsonl");

        let log = JsonlMessageLog::open(&path).await.unwrap();
        log.append(text("first")).await.unwrap();

        // Fragment that could not be cut off.
        append_fragment(&path);
        log.inner.lock().await.torn = true;

        log.append(text("second")).await.unwrap();
        let len_after_second = std::fs::metadata(&path).unwrap().len();
        log.inner.lock().await.repair().await;
        assert_eq!(std::fs::metadata(&path).unwrap().len(), len_after_second);

        log.append(text("third")).await.unwrap();
        drop(log);

        let log = JsonlMessageLog::open(&path).await.unwrap();
        assert_eq!(bodies(&log.tail(10).await.unwrap()), ["first", "second", "third"]);
    }
}
