//! Log tailer - incremental suffix reads of a growing, append-only log
//!
//! Cost per pass is proportional to newly appended bytes only, never to
//! total log size: each pass reads from the recorded offset to the current
//! end of file and advances the offset by the bytes actually read.

use crate::classify::OutputCollector;
use crate::control::TaskControl;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::warn;

/// Read position within a task's log file
#[derive(Debug, Clone, Default)]
pub struct LogCursor {
    /// Resolved lazily; the file may not exist until the task writes
    pub path: Option<PathBuf>,

    /// Bytes already consumed from the file; never decreases
    pub offset: u64,
}

/// Carry buffer for the unterminated tail fragment between reads
///
/// Bytes, not chars: a read may split a multi-byte sequence, and carrying
/// raw bytes keeps line output identical however the reads are chunked.
#[derive(Debug, Default)]
pub struct LineBuffer {
    partial: Vec<u8>,
}

impl LineBuffer {
    /// Append a chunk and drain every complete line, keeping the trailing
    /// fragment for the next read.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<String> {
        self.partial.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.partial.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.partial.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&line[..line.len() - 1]).into_owned());
        }
        lines
    }

    /// Unterminated bytes carried to the next read
    pub fn pending(&self) -> &[u8] {
        &self.partial
    }
}

/// Tails one task's log file through a cursor, feeding a collector
pub struct LogTailer {
    task_id: String,
    cursor: LogCursor,
    buffer: LineBuffer,
}

impl LogTailer {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            cursor: LogCursor::default(),
            buffer: LineBuffer::default(),
        }
    }

    pub fn cursor(&self) -> &LogCursor {
        &self.cursor
    }

    /// Resolve the log path if not already known. Returns whether a path
    /// is available; failure is transient and retried on the next pass.
    pub async fn resolve_path(&mut self, control: &dyn TaskControl) -> bool {
        if self.cursor.path.is_none() {
            if let Ok(path) = control.log_path(&self.task_id).await {
                self.cursor.path = Some(path);
            }
        }
        self.cursor.path.is_some()
    }

    /// One tail pass: read every byte past the cursor and classify the
    /// complete lines, in file order. A missing file, an unresolved path,
    /// and a read error are all no-ops until the next pass.
    pub async fn poll(&mut self, control: &dyn TaskControl, collector: &mut OutputCollector) {
        if !self.resolve_path(control).await {
            return;
        }
        let path = match &self.cursor.path {
            Some(path) => path.clone(),
            None => return,
        };

        let size = match tokio::fs::metadata(&path).await {
            Ok(meta) => meta.len(),
            Err(_) => return, // not created yet
        };
        if size <= self.cursor.offset {
            return;
        }

        match read_suffix(&path, self.cursor.offset, size).await {
            Ok(chunk) => {
                self.cursor.offset += chunk.len() as u64;
                for line in self.buffer.push_chunk(&chunk) {
                    collector.push_line(&line);
                }
            }
            Err(e) => {
                warn!("[{}] Error reading log: {}", self.task_id, e);
            }
        }
    }
}

/// Read `[offset, end)` from the file.
async fn read_suffix(path: &Path, offset: u64, end: u64) -> std::io::Result<Vec<u8>> {
    let mut file = File::open(path).await?;
    file.seek(SeekFrom::Start(offset)).await?;

    let mut buf = Vec::with_capacity((end - offset) as usize);
    file.take(end - offset).read_to_end(&mut buf).await?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use relay_foundation::{Error, Result};
    use std::io::Write;

    struct StaticControl {
        path: Option<PathBuf>,
    }

    #[async_trait]
    impl TaskControl for StaticControl {
        async fn status(&self, _task_id: &str) -> Result<String> {
            Ok("Status:     running".to_string())
        }

        async fn log_path(&self, task_id: &str) -> Result<PathBuf> {
            self.path
                .clone()
                .ok_or_else(|| Error::NotFound(task_id.to_string()))
        }
    }

    #[test]
    fn test_line_buffer_reassembly() {
        let mut buffer = LineBuffer::default();

        assert!(buffer.push_chunk(b"{\"a\"").is_empty());
        assert_eq!(buffer.push_chunk(b":1}\n{\"b\""), vec!["{\"a\":1}"]);
        assert_eq!(buffer.push_chunk(b":2}\n"), vec!["{\"b\":2}"]);
        assert!(buffer.pending().is_empty());
    }

    #[test]
    fn test_line_buffer_multibyte_split() {
        let mut buffer = LineBuffer::default();
        let text = "{\"msg\":\"héllo\"}\n".as_bytes();

        // Split inside the two-byte 'é' sequence
        let split = text.iter().position(|&b| b == 0xc3).unwrap() + 1;
        assert!(buffer.push_chunk(&text[..split]).is_empty());
        assert_eq!(buffer.push_chunk(&text[split..]), vec!["{\"msg\":\"héllo\"}"]);
    }

    #[tokio::test]
    async fn test_tail_reads_only_new_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("task.log");
        std::fs::write(&log_path, "{\"a\":1}\n").unwrap();

        let control = StaticControl {
            path: Some(log_path.clone()),
        };
        let mut tailer = LogTailer::new("task-a-b-1");
        let mut collector = OutputCollector::new("agent-1", None);

        tailer.poll(&control, &mut collector).await;
        assert_eq!(collector.output(), "{\"a\":1}\n");
        assert_eq!(tailer.cursor().offset, 8);

        // Append and poll again; only the new line is classified
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(&log_path)
            .unwrap();
        file.write_all(b"{\"b\":2}\n").unwrap();
        drop(file);

        tailer.poll(&control, &mut collector).await;
        assert_eq!(collector.output(), "{\"a\":1}\n{\"b\":2}\n");
        assert_eq!(tailer.cursor().offset, 16);
    }

    #[tokio::test]
    async fn test_chunking_invariance() {
        // Tailing in many passes yields the same classified output as one
        // pass, however the appends are chunked.
        let content = b"[1700000000000]{\"a\":1}\n=== section ===\n{\"msg\":\"h\xc3\xa9llo\"}\nnot json\n{\"b\":2}\n";

        let one_pass = {
            let dir = tempfile::tempdir().unwrap();
            let log_path = dir.path().join("task.log");
            std::fs::write(&log_path, content).unwrap();

            let control = StaticControl {
                path: Some(log_path),
            };
            let mut tailer = LogTailer::new("task-a-b-1");
            let mut collector = OutputCollector::new("agent-1", None);
            tailer.poll(&control, &mut collector).await;
            collector.into_output()
        };

        for chunk_size in [1, 2, 3, 7, 64] {
            let dir = tempfile::tempdir().unwrap();
            let log_path = dir.path().join("task.log");
            std::fs::write(&log_path, b"").unwrap();

            let control = StaticControl {
                path: Some(log_path.clone()),
            };
            let mut tailer = LogTailer::new("task-a-b-1");
            let mut collector = OutputCollector::new("agent-1", None);
            let mut last_offset = 0;

            for chunk in content.chunks(chunk_size) {
                let mut file = std::fs::OpenOptions::new()
                    .append(true)
                    .open(&log_path)
                    .unwrap();
                file.write_all(chunk).unwrap();
                drop(file);

                tailer.poll(&control, &mut collector).await;
                assert!(tailer.cursor().offset >= last_offset);
                last_offset = tailer.cursor().offset;
            }

            assert_eq!(collector.into_output(), one_pass, "chunk size {}", chunk_size);
            assert_eq!(last_offset, content.len() as u64);
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let control = StaticControl {
            path: Some(dir.path().join("absent.log")),
        };
        let mut tailer = LogTailer::new("task-a-b-1");
        let mut collector = OutputCollector::new("agent-1", None);

        tailer.poll(&control, &mut collector).await;
        assert_eq!(collector.output(), "");
        assert_eq!(tailer.cursor().offset, 0);
    }

    #[tokio::test]
    async fn test_unresolved_path_is_a_noop() {
        let control = StaticControl { path: None };
        let mut tailer = LogTailer::new("task-a-b-1");
        let mut collector = OutputCollector::new("agent-1", None);

        tailer.poll(&control, &mut collector).await;
        assert!(tailer.cursor().path.is_none());
        assert_eq!(collector.output(), "");
    }
}
