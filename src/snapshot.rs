use bytes::Bytes;
use tokio::sync::watch;

/// The last published payload together with its generation time.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub generated_at: i64,
    pub payload: Bytes,
}

/// Write half, held by the poller only.
pub struct SnapshotWriter {
    tx: watch::Sender<Option<Snapshot>>,
}

/// Read half, cloned into every gateway session. Readers always see a whole
/// snapshot: the writer swaps the value, it never edits it.
#[derive(Clone)]
pub struct SnapshotReader {
    rx: watch::Receiver<Option<Snapshot>>,
}

pub fn channel() -> (SnapshotWriter, SnapshotReader) {
    let (tx, rx) = watch::channel(None);
    (SnapshotWriter { tx }, SnapshotReader { rx })
}

impl SnapshotWriter {
    pub fn replace(&self, snapshot: Snapshot) {
        self.tx.send_replace(Some(snapshot));
    }

    pub fn reader(&self) -> SnapshotReader {
        SnapshotReader {
            rx: self.tx.subscribe(),
        }
    }
}

impl SnapshotReader {
    pub fn latest(&self) -> Option<Snapshot> {
        self.rx.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readers_see_latest_whole_value() {
        let (writer, reader) = channel();
        assert!(reader.latest().is_none());

        writer.replace(Snapshot {
            generated_at: 1,
            payload: Bytes::from_static(b"first"),
        });
        let late_reader = writer.reader();
        writer.replace(Snapshot {
            generated_at: 2,
            payload: Bytes::from_static(b"second"),
        });

        assert_eq!(reader.latest().unwrap().payload, Bytes::from_static(b"second"));
        assert_eq!(late_reader.latest().unwrap().generated_at, 2);
    }
}
