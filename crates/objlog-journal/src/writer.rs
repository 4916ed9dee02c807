use std::fmt;
use std::io::{BufWriter, Write};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use objlog_codec::{Record, RecordWriter};
use tracing::{debug, warn};

use crate::config::FlushPolicy;
use crate::error::{JournalError, JournalResult};

type Sink = RecordWriter<BufWriter<Box<dyn Write + Send>>>;
type SharedSink = Arc<Mutex<SinkState>>;

/// The open file, and the first background flush failure if there was one.
/// A failure poisons the journal: nothing more is written to it.
struct SinkState {
    writer: Option<Sink>,
    failure: Option<String>,
}

impl SinkState {
    fn writer(&mut self, name: &str) -> JournalResult<&mut Sink> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| JournalError::Closed(name.to_string()))?;
        if let Some(reason) = &self.failure {
            return Err(JournalError::FlushFailed {
                journal: name.to_string(),
                reason: reason.clone(),
            });
        }
        Ok(writer)
    }
}

/// Handle appending records to the live journal.
///
/// Clones share one buffered writer behind a mutex. Under
/// [`FlushPolicy::Periodic`] a background thread flushes the buffer on a
/// fixed period, taking the same mutex, so a flush never interleaves with an
/// append. A failed background flush is returned by the next append,
/// flush, or close.
#[derive(Clone)]
pub struct JournalWriter {
    name: Arc<str>,
    sink: SharedSink,
    flush_every_record: bool,
    timer: Arc<Mutex<Option<FlushTimer>>>,
}

impl JournalWriter {
    /// Start writing the journal `name` into `out`.
    pub fn start(name: &str, out: Box<dyn Write + Send>, policy: &FlushPolicy) -> Self {
        let sink: SharedSink = Arc::new(Mutex::new(SinkState {
            writer: Some(RecordWriter::new(BufWriter::new(out))),
            failure: None,
        }));
        let timer = policy
            .period()
            .map(|period| FlushTimer::spawn(name, Arc::downgrade(&sink), period));
        debug!(journal = name, ?policy, "journal writer started");
        Self {
            name: Arc::from(name),
            sink,
            flush_every_record: matches!(policy, FlushPolicy::EveryRecord),
            timer: Arc::new(Mutex::new(timer)),
        }
    }

    /// File name of the journal.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append one record.
    pub fn append(&self, record: &Record) -> JournalResult<()> {
        let mut guard = self.sink.lock().expect("journal mutex poisoned");
        let writer = guard.writer(&self.name)?;
        writer.write(record)?;
        if self.flush_every_record {
            writer.flush()?;
        }
        Ok(())
    }

    /// Push buffered records to the file without closing it.
    pub fn flush(&self) -> JournalResult<()> {
        let mut guard = self.sink.lock().expect("journal mutex poisoned");
        guard.writer(&self.name)?.flush()?;
        Ok(())
    }

    /// Records appended so far, or `None` once closed.
    pub fn records(&self) -> Option<u64> {
        let guard = self.sink.lock().expect("journal mutex poisoned");
        guard.writer.as_ref().map(|w| w.written())
    }

    pub fn is_closed(&self) -> bool {
        self.sink.lock().expect("journal mutex poisoned").writer.is_none()
    }

    /// Stop the flush timer, flush, and close the file.
    ///
    /// Returns the number of records the journal received. Every clone
    /// observes the close; later appends fail with [`JournalError::Closed`].
    /// A poisoned journal is closed as well, and the failure returned.
    pub fn close(&self) -> JournalResult<u64> {
        let timer = self.timer.lock().expect("timer mutex poisoned").take();
        if let Some(timer) = timer {
            timer.stop();
        }

        let (writer, failure) = {
            let mut guard = self.sink.lock().expect("journal mutex poisoned");
            (guard.writer.take(), guard.failure.clone())
        };
        let writer = writer.ok_or_else(|| JournalError::Closed(self.name.to_string()))?;
        if let Some(reason) = failure {
            return Err(JournalError::FlushFailed {
                journal: self.name.to_string(),
                reason,
            });
        }
        let records = writer.written();
        let mut out = writer.into_inner();
        out.flush()?;
        drop(out);
        debug!(journal = %self.name, records, "journal closed");
        Ok(records)
    }
}

impl fmt::Debug for JournalWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JournalWriter")
            .field("name", &self.name)
            .field("records", &self.records())
            .finish()
    }
}

/// Background thread flushing a journal on a fixed period.
struct FlushTimer {
    stop: Sender<()>,
    join: JoinHandle<()>,
}

impl FlushTimer {
    fn spawn(name: &str, sink: Weak<Mutex<SinkState>>, period: Duration) -> Self {
        let (stop, stopped) = mpsc::channel::<()>();
        let name = name.to_string();
        let join = thread::spawn(move || loop {
            match stopped.recv_timeout(period) {
                Err(RecvTimeoutError::Timeout) => {
                    let Some(sink) = sink.upgrade() else { break };
                    let mut guard = sink.lock().expect("journal mutex poisoned");
                    let Some(writer) = guard.writer.as_mut() else { break };
                    match writer.flush() {
                        Ok(()) => debug!(journal = %name, "periodic flush"),
                        Err(e) => {
                            warn!(journal = %name, error = %e, "periodic flush failed");
                            guard.failure = Some(e.to_string());
                            break;
                        }
                    }
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        });
        Self { stop, join }
    }

    fn stop(self) {
        let _ = self.stop.send(());
        let _ = self.join.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::Directory;
    use crate::memory::InMemoryDirectory;
    use objlog_types::{ObjectId, TypeIndex};
    use std::time::Instant;

    fn created(id: u32) -> Record {
        Record::ObjectCreated {
            type_index: TypeIndex::new(1),
            object_id: ObjectId::new(id),
        }
    }

    fn journal(dir: &InMemoryDirectory, policy: FlushPolicy) -> JournalWriter {
        JournalWriter::start("1.log", dir.create_append("1.log").unwrap(), &policy)
    }

    #[test]
    fn manual_policy_buffers_until_flush() {
        let dir = InMemoryDirectory::new();
        let writer = journal(&dir, FlushPolicy::Manual);
        writer.append(&created(2)).unwrap();
        assert_eq!(dir.read_to_string("1.log").unwrap(), "");
        writer.flush().unwrap();
        assert_eq!(dir.read_to_string("1.log").unwrap(), "{\"c\":\"oc\",\"ti\":1,\"oi\":2}\n");
        assert_eq!(writer.records(), Some(1));
    }

    #[test]
    fn every_record_policy_flushes_each_append() {
        let dir = InMemoryDirectory::new();
        let writer = journal(&dir, FlushPolicy::EveryRecord);
        writer.append(&created(2)).unwrap();
        writer.append(&created(3)).unwrap();
        assert_eq!(dir.read_to_string("1.log").unwrap().lines().count(), 2);
    }

    #[test]
    fn periodic_timer_flushes_in_background() {
        let dir = InMemoryDirectory::new();
        let writer = journal(&dir, FlushPolicy::periodic(Duration::from_millis(10)));
        writer.append(&created(2)).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while dir.read_to_string("1.log").unwrap().is_empty() {
            assert!(Instant::now() < deadline, "timer never flushed");
            thread::sleep(Duration::from_millis(5));
        }
        writer.close().unwrap();
    }

    /// Accepts nothing.
    struct BrokenDisk;

    impl Write for BrokenDisk {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("disk gone"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn failed_periodic_flush_is_reported() {
        let writer = JournalWriter::start(
            "1.log",
            Box::new(BrokenDisk),
            &FlushPolicy::periodic(Duration::from_millis(5)),
        );
        writer.append(&created(2)).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let err = loop {
            match writer.append(&created(3)) {
                Ok(()) => {
                    assert!(Instant::now() < deadline, "flush failure never surfaced");
                    thread::sleep(Duration::from_millis(5));
                }
                Err(e) => break e,
            }
        };
        assert!(matches!(&err, JournalError::FlushFailed { reason, .. } if reason.contains("disk gone")));
        assert!(matches!(writer.flush(), Err(JournalError::FlushFailed { .. })));
        assert!(matches!(writer.close(), Err(JournalError::FlushFailed { .. })));
        assert!(writer.is_closed());
    }

    #[test]
    fn close_flushes_and_rejects_further_appends() {
        let dir = InMemoryDirectory::new();
        let writer = journal(&dir, FlushPolicy::default());
        let clone = writer.clone();
        clone.append(&created(2)).unwrap();

        assert_eq!(writer.close().unwrap(), 1);
        assert!(clone.is_closed());
        assert_eq!(dir.read_to_string("1.log").unwrap().lines().count(), 1);
        assert!(matches!(clone.append(&created(3)), Err(JournalError::Closed(_))));
        assert!(matches!(writer.close(), Err(JournalError::Closed(_))));
    }

    #[test]
    fn concurrent_appends_keep_whole_lines() {
        let dir = InMemoryDirectory::new();
        let writer = journal(&dir, FlushPolicy::periodic(Duration::from_millis(1)));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let writer = writer.clone();
                thread::spawn(move || {
                    for i in 0..50 {
                        writer.append(&created(2 + t * 50 + i)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(writer.close().unwrap(), 200);

        let text = dir.read_to_string("1.log").unwrap();
        assert_eq!(text.lines().count(), 200);
        for line in text.lines() {
            assert!(Record::from_line(line).is_ok());
        }
    }
}
