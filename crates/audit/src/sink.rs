//! Append-only segmented sink

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};

use crate::record::{AuditEvent, AuditRecord};

/// Handle to the audit log. Cheap to clone; all appends funnel through one
/// writer task.
#[derive(Clone)]
pub struct AuditSink {
    tx: mpsc::UnboundedSender<AuditRecord>,
    seqs: Arc<Mutex<HashMap<String, u64>>>,
    events: broadcast::Sender<AuditRecord>,
}

impl AuditSink {
    /// Open the sink. Creates the directory when needed and spawns the
    /// writer task.
    pub fn open(dir: impl AsRef<Path>, segment_max_bytes: u64) -> std::io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(256);

        tokio::spawn(writer_loop(dir, segment_max_bytes, rx));

        Ok(Self {
            tx,
            seqs: Arc::new(Mutex::new(HashMap::new())),
            events,
        })
    }

    /// Append one record. Allocates the next sequence number in the event's
    /// scope and returns it.
    pub fn emit(&self, event: AuditEvent) -> u64 {
        let seq = {
            let mut seqs = self.seqs.lock();
            let counter = seqs.entry(event.scope()).or_insert(0);
            *counter += 1;
            *counter
        };

        let record = AuditRecord::from_event(event, seq);
        let _ = self.events.send(record.clone());
        if self.tx.send(record).is_err() {
            tracing::error!("Audit writer task is gone; record dropped from disk log");
        }
        seq
    }

    /// Live feed of appended records (the `audit.record` topic).
    pub fn subscribe(&self) -> broadcast::Receiver<AuditRecord> {
        self.events.subscribe()
    }
}

struct Segment {
    file: File,
    path: PathBuf,
    date: String,
    written: u64,
    index: u32,
}

async fn writer_loop(
    dir: PathBuf,
    segment_max_bytes: u64,
    mut rx: mpsc::UnboundedReceiver<AuditRecord>,
) {
    let mut segment: Option<Segment> = None;

    while let Some(record) = rx.recv().await {
        let line = match serde_json::to_string(&record) {
            Ok(line) => line,
            Err(error) => {
                tracing::error!(%error, "Audit record failed to serialize");
                continue;
            }
        };

        let today = Utc::now().format("%Y-%m-%d").to_string();
        let needs_new = match &segment {
            None => true,
            Some(s) => s.date != today || s.written >= segment_max_bytes,
        };

        if needs_new {
            let index = match &segment {
                Some(s) if s.date == today => s.index + 1,
                _ => 0,
            };
            match open_segment(&dir, &today, index) {
                Ok(s) => segment = Some(s),
                Err(error) => {
                    tracing::error!(%error, "Failed to open audit segment");
                    continue;
                }
            }
        }

        if let Some(s) = segment.as_mut() {
            if let Err(error) = writeln!(s.file, "{}", line) {
                tracing::error!(%error, path = %s.path.display(), "Audit append failed");
            } else {
                s.written += line.len() as u64 + 1;
            }
        }
    }
}

fn open_segment(dir: &Path, date: &str, index: u32) -> std::io::Result<Segment> {
    let name = if index == 0 {
        format!("audit-{}.jsonl", date)
    } else {
        format!("audit-{}.{}.jsonl", date, index)
    };
    let path = dir.join(name);

    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    let written = file.metadata()?.len();

    Ok(Segment {
        file,
        path,
        date: date.to_string(),
        written,
        index,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    async fn drain(sink: &AuditSink) {
        // Writer task is async; give it a tick to flush
        for _ in 0..10 {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            if sink.tx.is_closed() {
                break;
            }
        }
    }

    #[tokio::test]
    async fn test_per_incident_seq_has_no_gaps() {
        let dir = tempfile::tempdir().unwrap();
        let sink = AuditSink::open(dir.path(), 1024 * 1024).unwrap();
        let incident = Uuid::new_v4();

        let seqs: Vec<u64> = (0..5)
            .map(|_| sink.emit(AuditEvent::new("s1", "incident", "step").incident(incident)))
            .collect();

        assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_incident_and_session_scopes_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let sink = AuditSink::open(dir.path(), 1024 * 1024).unwrap();
        let incident = Uuid::new_v4();

        assert_eq!(sink.emit(AuditEvent::new("s1", "rules", "ok")), 1);
        assert_eq!(
            sink.emit(AuditEvent::new("s1", "incident", "opened").incident(incident)),
            1
        );
        assert_eq!(sink.emit(AuditEvent::new("s1", "rules", "ok")), 2);
    }

    #[tokio::test]
    async fn test_records_land_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let sink = AuditSink::open(dir.path(), 1024 * 1024).unwrap();

        sink.emit(
            AuditEvent::new("s1", "rules", "direct_intent")
                .utterance(7)
                .payload(serde_json::json!({"rule": "living_room_light_on"})),
        );
        drain(&sink).await;

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);

        let content = std::fs::read_to_string(entries[0].as_ref().unwrap().path()).unwrap();
        let record: AuditRecord = serde_json::from_str(content.lines().next().unwrap()).unwrap();
        assert_eq!(record.stage, "rules");
        assert_eq!(record.utterance_id, Some(7));
        assert_eq!(record.payload_hash.len(), 64);
    }

    #[tokio::test]
    async fn test_size_rotation() {
        let dir = tempfile::tempdir().unwrap();
        // Tiny bound so every record rotates
        let sink = AuditSink::open(dir.path(), 64).unwrap();

        for i in 0..3 {
            sink.emit(AuditEvent::new("s1", "rules", "ok").utterance(i));
        }
        drain(&sink).await;

        let count = std::fs::read_dir(dir.path()).unwrap().count();
        assert!(count >= 2, "expected rotated segments, found {}", count);
    }

    #[tokio::test]
    async fn test_subscribe_sees_records() {
        let dir = tempfile::tempdir().unwrap();
        let sink = AuditSink::open(dir.path(), 1024 * 1024).unwrap();
        let mut rx = sink.subscribe();

        sink.emit(AuditEvent::new("s1", "rules", "ok"));
        let record = rx.recv().await.unwrap();
        assert_eq!(record.seq, 1);
    }
}
