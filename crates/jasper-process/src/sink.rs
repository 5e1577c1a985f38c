//! Output sinks that receive a child's stdout/stderr
//!
//! A sink is the configured form of a logger specification: it receives raw
//! bytes tagged with the stream they came from. Sinks are shared between the
//! pump tasks of a process, so every implementation is internally
//! synchronized.

use std::collections::VecDeque;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Which child stream a chunk of bytes came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stream {
    Output,
    Error,
}

/// A destination for process output.
pub trait LogSink: Send + Sync + fmt::Debug {
    /// Write a chunk of bytes from `stream`.
    fn write(&self, stream: Stream, buf: &[u8]) -> io::Result<()>;

    /// Flush buffered data.
    fn flush(&self) -> io::Result<()> {
        Ok(())
    }

    /// Release the sink. Writes after close are dropped.
    fn close(&self) -> io::Result<()> {
        self.flush()
    }

    /// Most recent lines, for sinks that retain what they receive.
    fn recent_lines(&self, _count: usize) -> Option<Vec<String>> {
        None
    }
}

fn split_lines(buf: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(buf)
        .lines()
        .map(str::to_string)
        .collect()
}

/// Drops everything.
#[derive(Debug, Default)]
pub struct DiscardSink;

impl LogSink for DiscardSink {
    fn write(&self, _stream: Stream, _buf: &[u8]) -> io::Result<()> {
        Ok(())
    }
}

/// Keeps the last `capacity` lines in memory.
#[derive(Debug)]
pub struct InMemorySink {
    capacity: usize,
    lines: Mutex<VecDeque<String>>,
}

impl InMemorySink {
    /// Create a ring that holds at most `capacity` lines.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            lines: Mutex::new(VecDeque::new()),
        }
    }

    /// Number of retained lines.
    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    /// Whether nothing has been retained.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LogSink for InMemorySink {
    fn write(&self, _stream: Stream, buf: &[u8]) -> io::Result<()> {
        let mut lines = self.lines.lock();
        for line in split_lines(buf) {
            if lines.len() == self.capacity {
                lines.pop_front();
            }
            lines.push_back(line);
        }
        Ok(())
    }

    fn recent_lines(&self, count: usize) -> Option<Vec<String>> {
        let lines = self.lines.lock();
        let skip = lines.len().saturating_sub(count);
        Some(lines.iter().skip(skip).cloned().collect())
    }
}

/// Appends to a file on disk.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl FileSink {
    /// Open (creating if needed) `path` for appending.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(Some(file)),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for FileSink {
    fn write(&self, _stream: Stream, buf: &[u8]) -> io::Result<()> {
        match self.file.lock().as_mut() {
            Some(file) => file.write_all(buf),
            None => Ok(()),
        }
    }

    fn flush(&self) -> io::Result<()> {
        match self.file.lock().as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }

    fn close(&self) -> io::Result<()> {
        if let Some(mut file) = self.file.lock().take() {
            file.flush()?;
        }
        Ok(())
    }
}

/// Writes to this service's own stdout/stderr.
#[derive(Debug, Default)]
pub struct InheritSink;

impl LogSink for InheritSink {
    fn write(&self, stream: Stream, buf: &[u8]) -> io::Result<()> {
        match stream {
            Stream::Output => io::stdout().lock().write_all(buf),
            Stream::Error => io::stderr().lock().write_all(buf),
        }
    }

    fn flush(&self) -> io::Result<()> {
        io::stdout().lock().flush()?;
        io::stderr().lock().flush()
    }
}

/// Emits each line as a `tracing` event; stderr lines are logged at error.
#[derive(Debug, Default)]
pub struct TracingSink {
    prefix: String,
}

impl TracingSink {
    /// Create a sink whose events carry `prefix` as a field.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl LogSink for TracingSink {
    fn write(&self, stream: Stream, buf: &[u8]) -> io::Result<()> {
        for line in split_lines(buf) {
            match stream {
                Stream::Output => info!(target: "jasper::output", prefix = %self.prefix, "{}", line),
                Stream::Error => error!(target: "jasper::output", prefix = %self.prefix, "{}", line),
            }
        }
        Ok(())
    }
}

/// Remote collectors reachable over HTTP.
#[derive(Debug, Clone)]
pub enum HttpTarget {
    /// Splunk HTTP event collector.
    Splunk {
        url: String,
        token: String,
        channel: Option<String>,
    },
    /// Sumo Logic hosted HTTP source.
    Sumologic { endpoint: String },
}

/// Forwards lines to a remote collector from a background task.
///
/// Lines are queued without blocking the writer; the task posts whatever has
/// accumulated each time it wakes. Closing the sink drains the queue.
#[derive(Debug)]
pub struct HttpSink {
    tx: Mutex<Option<mpsc::UnboundedSender<String>>>,
}

const HTTP_BATCH_SIZE: usize = 100;

impl HttpSink {
    /// Start the forwarding task on the current tokio runtime.
    pub fn spawn(target: HttpTarget) -> io::Result<Self> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        let (tx, rx) = mpsc::unbounded_channel();
        handle.spawn(forward(target, rx));
        Ok(Self {
            tx: Mutex::new(Some(tx)),
        })
    }
}

impl LogSink for HttpSink {
    fn write(&self, _stream: Stream, buf: &[u8]) -> io::Result<()> {
        if let Some(tx) = self.tx.lock().as_ref() {
            for line in split_lines(buf) {
                if tx.send(line).is_err() {
                    return Err(io::Error::new(
                        io::ErrorKind::BrokenPipe,
                        "log forwarder stopped",
                    ));
                }
            }
        }
        Ok(())
    }

    fn close(&self) -> io::Result<()> {
        self.tx.lock().take();
        Ok(())
    }
}

async fn forward(target: HttpTarget, mut rx: mpsc::UnboundedReceiver<String>) {
    let client = reqwest::Client::new();
    let mut batch = Vec::with_capacity(HTTP_BATCH_SIZE);

    while let Some(line) = rx.recv().await {
        batch.push(line);
        while batch.len() < HTTP_BATCH_SIZE {
            match rx.try_recv() {
                Ok(line) => batch.push(line),
                Err(_) => break,
            }
        }

        if let Err(e) = post_batch(&client, &target, &batch).await {
            warn!(error = %e, lines = batch.len(), "Failed to forward log lines");
        }
        batch.clear();
    }

    debug!("Log forwarder finished");
}

async fn post_batch(
    client: &reqwest::Client,
    target: &HttpTarget,
    batch: &[String],
) -> Result<(), reqwest::Error> {
    let request = match target {
        HttpTarget::Splunk {
            url,
            token,
            channel,
        } => {
            let body: String = batch
                .iter()
                .map(|line| serde_json::json!({ "event": line }).to_string())
                .collect();
            let mut request = client
                .post(format!("{}/services/collector/event", url.trim_end_matches('/')))
                .header("Authorization", format!("Splunk {}", token))
                .body(body);
            if let Some(channel) = channel {
                request = request.header("X-Splunk-Request-Channel", channel);
            }
            request
        }
        HttpTarget::Sumologic { endpoint } => client.post(endpoint).body(batch.join("\n")),
    };

    request.send().await?.error_for_status()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_keeps_last_lines() {
        let sink = InMemorySink::new(3);
        sink.write(Stream::Output, b"one\ntwo\n").unwrap();
        sink.write(Stream::Error, b"three\nfour\n").unwrap();

        assert_eq!(sink.len(), 3);
        assert_eq!(
            sink.recent_lines(10).unwrap(),
            vec!["two".to_string(), "three".to_string(), "four".to_string()]
        );
        assert_eq!(sink.recent_lines(1).unwrap(), vec!["four".to_string()]);
    }

    #[test]
    fn test_file_sink_appends_and_closes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.log");

        let sink = FileSink::open(&path).unwrap();
        sink.write(Stream::Output, b"hello\n").unwrap();
        sink.close().unwrap();
        // writes after close are dropped
        sink.write(Stream::Output, b"ignored\n").unwrap();

        let sink = FileSink::open(&path).unwrap();
        sink.write(Stream::Error, b"again\n").unwrap();
        sink.close().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "hello\nagain\n");
    }

    #[test]
    fn test_discard_accepts_everything() {
        let sink = DiscardSink;
        assert!(sink.write(Stream::Output, b"anything").is_ok());
        assert!(sink.recent_lines(5).is_none());
    }

    #[test]
    fn test_http_sink_requires_runtime() {
        let result = HttpSink::spawn(HttpTarget::Sumologic {
            endpoint: "http://localhost:1".to_string(),
        });
        assert!(result.is_err());
    }
}
