use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};

use super::errors::TailingError;

/// One line produced by a read cycle, with the byte offset it ends at.
#[derive(Debug, Clone)]
pub struct ReadLine {
    pub content: String,
    pub offset_end: u64,
}

/// Outcome of a single `TailReader::poll` cycle (spec §4.1 read algorithm).
/// `lines` is every line read but not yet acknowledged via `ack` — it may
/// include lines already returned by a previous `poll` that the caller
/// couldn't deliver (backpressure), not just newly read ones.
#[derive(Debug, Default)]
pub struct PollOutcome {
    pub lines: Vec<ReadLine>,
    pub rotated: bool,
}

/// Per-source byte-offset reader implementing the read algorithm in spec
/// §4.1 step by step: stat, detect rotation, read the delta, split on `\n`,
/// hold a trailing partial line until a newline arrives or it has been
/// stable at EOF for `MaxPartialLineHold`.
///
/// Reading and acknowledgment are separate: `poll` advances `read_cursor`
/// (how far bytes have been pulled off disk) and queues complete lines in
/// `undelivered`; only `ack` advances `offset`, the committed/persisted
/// progress a caller reports back after a line actually reaches the
/// consumer. A line that hits backpressure stays in `undelivered` and is
/// handed back on the next `poll` instead of being read again from disk —
/// it is never silently dropped, and `offset` (what gets checkpointed)
/// never moves past what was actually delivered (spec §8 invariant #5,
/// §4.1 step 5).
#[derive(Debug)]
pub struct TailReader {
    offset: u64,
    read_cursor: u64,
    known_size: u64,
    undelivered: VecDeque<ReadLine>,
    pending: Option<PendingLine>,
    max_partial_line_hold: Duration,
}

#[derive(Debug)]
struct PendingLine {
    bytes: Vec<u8>,
    first_seen: Instant,
}

impl TailReader {
    /// `initial_offset` is `currentSize` on first `AddSource` (do not replay
    /// history), or the persisted checkpoint offset on restart.
    pub fn new(initial_offset: u64, max_partial_line_hold: Duration) -> Self {
        Self {
            offset: initial_offset,
            read_cursor: initial_offset,
            known_size: initial_offset,
            undelivered: VecDeque::new(),
            pending: None,
            max_partial_line_hold,
        }
    }

    /// Last offset acknowledged via `ack` — safe to persist as a checkpoint.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn known_size(&self) -> u64 {
        self.known_size
    }

    /// Runs one cycle of the read algorithm against `path`. Pass the current
    /// `tailing.max_partial_line_hold_ms`-derived stability check in by
    /// calling this whenever the source's watcher or poll tick fires.
    pub async fn poll(&mut self, path: &std::path::Path) -> Result<PollOutcome, TailingError> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|source| TailingError::Io {
                path: path.display().to_string(),
                source,
            })?;
        let size = metadata.len();

        if size < self.read_cursor {
            // Rotation/truncation: spec §4.1 step 2. Whatever was still
            // undelivered belonged to a file that no longer exists; there
            // is nothing left to redeliver it from.
            self.offset = 0;
            self.read_cursor = 0;
            self.known_size = 0;
            self.pending = None;
            self.undelivered.clear();
            return Ok(PollOutcome {
                lines: Vec::new(),
                rotated: true,
            });
        }

        self.known_size = size;

        if size == self.read_cursor {
            return Ok(PollOutcome {
                lines: self.undelivered.iter().cloned().collect(),
                rotated: false,
            });
        }

        let mut file = File::open(path).await.map_err(|source| TailingError::Io {
            path: path.display().to_string(),
            source,
        })?;
        file.seek(SeekFrom::Start(self.read_cursor))
            .await
            .map_err(|source| TailingError::Io {
                path: path.display().to_string(),
                source,
            })?;

        let to_read = (size - self.read_cursor) as usize;
        let mut buf = vec![0u8; to_read];
        file.read_exact(&mut buf)
            .await
            .map_err(|source| TailingError::Io {
                path: path.display().to_string(),
                source,
            })?;

        let mut combined = self.pending.take().map(|p| p.bytes).unwrap_or_default();
        combined.extend_from_slice(&buf);

        let read_start = self.read_cursor;
        let mut consumed = 0usize;
        let mut search_start = 0usize;
        while let Some(rel_nl) = combined[search_start..].iter().position(|&b| b == b'\n') {
            let nl = search_start + rel_nl;
            let line_bytes = &combined[consumed..nl];
            self.undelivered.push_back(ReadLine {
                content: String::from_utf8_lossy(line_bytes).trim_end_matches('\r').to_string(),
                offset_end: read_start + (nl + 1) as u64,
            });
            consumed = nl + 1;
            search_start = consumed;
        }
        self.read_cursor = read_start + consumed as u64;

        let tail = &combined[consumed..];
        if tail.is_empty() {
            self.pending = None;
        } else {
            let first_seen = match self.pending.take() {
                // Pending already existed before this cycle: if the bytes we
                // held are still a strict prefix of the new tail, the same
                // fragment is still growing, so its age is preserved.
                Some(p) if tail.starts_with(p.bytes.as_slice()) => p.first_seen,
                _ => Instant::now(),
            };
            self.pending = Some(PendingLine {
                bytes: tail.to_vec(),
                first_seen,
            });
        }

        Ok(PollOutcome {
            lines: self.undelivered.iter().cloned().collect(),
            rotated: false,
        })
    }

    /// Advances the committed/persisted offset up to `through`, the
    /// `offset_end` of the last line the caller actually got to the
    /// consumer. Lines at or beyond a gap (not yet acked) stay in
    /// `undelivered` and are handed back by the next `poll`.
    pub fn ack(&mut self, through: u64) {
        while let Some(front) = self.undelivered.front() {
            if front.offset_end > through {
                break;
            }
            self.offset = front.offset_end;
            self.undelivered.pop_front();
        }
    }

    /// Force-emits the held partial line if it has been stable at EOF for
    /// `max_partial_line_hold` (spec §8 boundary case). The forced line
    /// joins `undelivered` like any other — if the caller can't deliver it,
    /// it is retried on the next `poll` rather than lost. Call this after a
    /// `poll` that produced no growth (`size == offset` still held, or a
    /// poll cycle returned no new lines and the size did not change).
    pub fn take_stale_partial(&mut self) -> Option<ReadLine> {
        let pending = self.pending.as_ref()?;
        if pending.first_seen.elapsed() < self.max_partial_line_hold {
            return None;
        }
        let pending = self.pending.take()?;
        let offset_end = self.read_cursor + pending.bytes.len() as u64;
        self.read_cursor = offset_end;
        let line = ReadLine {
            content: String::from_utf8_lossy(&pending.bytes).trim_end_matches('\r').to_string(),
            offset_end,
        };
        self.undelivered.push_back(line.clone());
        Some(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    async fn write_file(path: &std::path::Path, contents: &[u8]) {
        let mut f = tokio::fs::File::create(path).await.unwrap();
        f.write_all(contents).await.unwrap();
        f.flush().await.unwrap();
    }

    #[tokio::test]
    async fn emits_complete_lines_and_holds_partial() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.log");
        write_file(&path, b"A\nB\nC").await;

        let mut reader = TailReader::new(0, Duration::from_secs(5));
        let outcome = reader.poll(&path).await.unwrap();
        assert_eq!(outcome.lines.len(), 2);
        assert_eq!(outcome.lines[0].content, "A");
        assert_eq!(outcome.lines[1].content, "B");
        assert!(!outcome.rotated);
        // "C" has no trailing newline yet, so it must not be emitted.
        assert_eq!(reader.offset(), 0);
        reader.ack(outcome.lines[1].offset_end);
        assert_eq!(reader.offset(), 4);
    }

    #[tokio::test]
    async fn unacked_lines_are_redelivered_not_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.log");
        write_file(&path, b"A\nB\n").await;

        let mut reader = TailReader::new(0, Duration::from_secs(5));
        let outcome = reader.poll(&path).await.unwrap();
        assert_eq!(outcome.lines.len(), 2);
        // Simulate backpressure on "A": nothing gets acked.
        assert_eq!(reader.offset(), 0);

        // A later poll with no file growth must hand back the same
        // undelivered lines rather than losing them.
        let outcome = reader.poll(&path).await.unwrap();
        assert_eq!(outcome.lines.len(), 2);
        assert_eq!(outcome.lines[0].content, "A");
        assert_eq!(outcome.lines[1].content, "B");

        reader.ack(outcome.lines[0].offset_end);
        assert_eq!(reader.offset(), 2);
        let outcome = reader.poll(&path).await.unwrap();
        assert_eq!(outcome.lines.len(), 1);
        assert_eq!(outcome.lines[0].content, "B");
    }

    #[tokio::test]
    async fn completes_partial_line_on_next_growth() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.log");
        write_file(&path, b"A\nB").await;

        let mut reader = TailReader::new(0, Duration::from_secs(5));
        let outcome = reader.poll(&path).await.unwrap();
        reader.ack(outcome.lines[0].offset_end);

        tokio::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .await
            .unwrap()
            .write_all(b"C\n")
            .await
            .unwrap();

        let outcome = reader.poll(&path).await.unwrap();
        assert_eq!(outcome.lines.len(), 1);
        assert_eq!(outcome.lines[0].content, "BC");
    }

    #[tokio::test]
    async fn stale_partial_is_force_emitted_after_hold() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.log");
        write_file(&path, b"A\nB").await;

        let mut reader = TailReader::new(0, Duration::from_millis(1));
        let outcome = reader.poll(&path).await.unwrap();
        reader.ack(outcome.lines[0].offset_end);
        tokio::time::sleep(Duration::from_millis(5)).await;

        let forced = reader.take_stale_partial().unwrap();
        assert_eq!(forced.content, "B");
        reader.ack(forced.offset_end);
        assert_eq!(reader.offset(), 3);
    }

    #[tokio::test]
    async fn rotation_resets_offset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.log");
        write_file(&path, b"X\n").await;

        let mut reader = TailReader::new(0, Duration::from_secs(5));
        let outcome = reader.poll(&path).await.unwrap();
        assert_eq!(outcome.lines[0].content, "X");
        reader.ack(outcome.lines[0].offset_end);

        write_file(&path, b"Y\n").await;
        let outcome = reader.poll(&path).await.unwrap();
        assert!(outcome.rotated);
        let outcome = reader.poll(&path).await.unwrap();
        assert_eq!(outcome.lines.len(), 1);
        assert_eq!(outcome.lines[0].content, "Y");
    }
}
