//! Stdio policy for a process

use std::fmt;
use std::io;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ProcessError, Result};
use crate::options::logger::LoggerSpec;
use crate::sink::{DiscardSink, LogSink, Stream};

/// Fan-out writer handed to the pump tasks of a process.
///
/// A writer with no targets is the discard writer: the matching child stream
/// is not piped at all.
#[derive(Clone, Default)]
pub struct OutputWriter {
    targets: Arc<Vec<(Arc<dyn LogSink>, Stream)>>,
}

impl OutputWriter {
    fn new(targets: Vec<(Arc<dyn LogSink>, Stream)>) -> Self {
        Self {
            targets: Arc::new(targets),
        }
    }

    /// Writer that drops everything.
    pub fn discard() -> Self {
        Self::default()
    }

    /// Whether writes go nowhere.
    pub fn is_discard(&self) -> bool {
        self.targets.is_empty()
    }

    /// Write `buf` to every target. Every target is attempted; the first
    /// failure is reported.
    pub fn write(&self, buf: &[u8]) -> io::Result<()> {
        let mut first_error = None;
        for (sink, stream) in self.targets.iter() {
            if let Err(e) = sink.write(*stream, buf) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Flush every target.
    pub fn flush(&self) -> io::Result<()> {
        let mut first_error = None;
        for (sink, _) in self.targets.iter() {
            if let Err(e) = sink.flush() {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Same writer, compared by identity.
    pub fn same_as(&self, other: &OutputWriter) -> bool {
        Arc::ptr_eq(&self.targets, &other.targets)
    }
}

impl fmt::Debug for OutputWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputWriter")
            .field("targets", &self.targets.len())
            .finish()
    }
}

#[derive(Debug, Default)]
struct OutputState {
    loggers: Option<Vec<Arc<dyn LogSink>>>,
    output: Option<OutputWriter>,
    error: Option<OutputWriter>,
    closed: bool,
}

/// Where a process's stdout and stderr go.
///
/// Explicit `output`/`error` sinks are in-process only and never cross the
/// wire; loggers are configured lazily the first time a writer is requested
/// and the resulting writers are memoized.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputOptions {
    #[serde(skip)]
    pub output: Option<Arc<dyn LogSink>>,
    #[serde(skip)]
    pub error: Option<Arc<dyn LogSink>>,
    #[serde(default)]
    pub suppress_output: bool,
    #[serde(default)]
    pub suppress_error: bool,
    #[serde(default)]
    pub send_output_to_error: bool,
    #[serde(default)]
    pub send_error_to_output: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub loggers: Vec<LoggerSpec>,
    #[serde(skip)]
    state: Arc<Mutex<OutputState>>,
}

impl PartialEq for OutputOptions {
    fn eq(&self, other: &Self) -> bool {
        self.suppress_output == other.suppress_output
            && self.suppress_error == other.suppress_error
            && self.send_output_to_error == other.send_output_to_error
            && self.send_error_to_output == other.send_error_to_output
            && self.loggers == other.loggers
    }
}

fn same_sink(a: &Arc<dyn LogSink>, b: &Arc<dyn LogSink>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

impl OutputOptions {
    /// Options that keep the last `capacity` lines of both streams in memory.
    pub fn in_memory(capacity: usize) -> Self {
        Self {
            loggers: vec![LoggerSpec::InMemory(
                crate::options::logger::InMemoryLoggerOptions {
                    in_memory_cap: capacity,
                },
            )],
            ..Default::default()
        }
    }

    /// Check the suppression and redirection rules.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.suppress_output && self.output.is_some() {
            problems.push("cannot suppress output if output is defined");
        }
        if self.suppress_error && self.error.is_some() {
            problems.push("cannot suppress error if error is defined");
        }
        if let (Some(output), Some(error)) = (&self.output, &self.error) {
            if same_sink(output, error) {
                problems.push("cannot specify the same value for error and output");
            }
        }
        if self.suppress_output && self.send_output_to_error {
            problems.push("cannot suppress output and redirect it to error");
        }
        if self.suppress_error && self.send_error_to_output {
            problems.push("cannot suppress error and redirect it to output");
        }
        if self.send_output_to_error && self.error.is_none() && self.loggers.is_empty() {
            problems.push("cannot redirect output to error without a defined error writer");
        }
        if self.send_error_to_output && self.output.is_none() && self.loggers.is_empty() {
            problems.push("cannot redirect error to output without a defined output writer");
        }
        if self.send_output_to_error && self.send_error_to_output {
            problems.push("cannot create redirect cycle between output and error");
        }

        let mut errors: Vec<ProcessError> = problems
            .into_iter()
            .map(|p| ProcessError::InvalidInput(p.to_string()))
            .collect();
        for logger in &self.loggers {
            if let Err(e) = logger.validate() {
                errors.push(e);
            }
        }

        ProcessError::from_many(errors)
    }

    /// Copy of these options with no memoized writers, for a new process.
    pub fn detached(&self) -> Self {
        Self {
            state: Arc::default(),
            ..self.clone()
        }
    }

    fn logger_sinks(&self, state: &mut OutputState) -> Vec<Arc<dyn LogSink>> {
        state
            .loggers
            .get_or_insert_with(|| {
                self.loggers
                    .iter()
                    .map(|spec| match spec.configure() {
                        Ok(sink) => sink,
                        Err(e) => {
                            warn!(
                                logger = spec.type_name(),
                                error = %e,
                                "Logger configuration failed, discarding its output"
                            );
                            Arc::new(DiscardSink) as Arc<dyn LogSink>
                        }
                    })
                    .collect()
            })
            .clone()
    }

    fn writer_for(&self, state: &mut OutputState, stream: Stream) -> OutputWriter {
        let (suppressed, explicit) = match stream {
            Stream::Output => (self.suppress_output, &self.output),
            Stream::Error => (self.suppress_error, &self.error),
        };
        if suppressed {
            return OutputWriter::discard();
        }

        let mut targets: Vec<(Arc<dyn LogSink>, Stream)> = Vec::new();
        if let Some(sink) = explicit {
            targets.push((Arc::clone(sink), stream));
        }
        for sink in self.logger_sinks(state) {
            targets.push((sink, stream));
        }
        OutputWriter::new(targets)
    }

    /// Writer for the child's stdout.
    pub fn get_output(&self) -> OutputWriter {
        if self.send_output_to_error {
            return self.get_error();
        }

        let mut state = self.state.lock();
        if let Some(writer) = &state.output {
            return writer.clone();
        }
        let writer = self.writer_for(&mut state, Stream::Output);
        state.output = Some(writer.clone());
        writer
    }

    /// Writer for the child's stderr.
    pub fn get_error(&self) -> OutputWriter {
        if self.send_error_to_output {
            return self.get_output();
        }

        let mut state = self.state.lock();
        if let Some(writer) = &state.error {
            return writer.clone();
        }
        let writer = self.writer_for(&mut state, Stream::Error);
        state.error = Some(writer.clone());
        writer
    }

    /// Most recent lines retained by the first in-memory logger.
    pub fn in_memory_lines(&self, count: usize) -> Option<Vec<String>> {
        let mut state = self.state.lock();
        self.output
            .iter()
            .chain(self.error.iter())
            .cloned()
            .chain(self.logger_sinks(&mut state))
            .find_map(|sink| sink.recent_lines(count))
    }

    /// Close the sinks configured from `loggers`. Explicit `output` and
    /// `error` sinks belong to whoever supplied them and stay open. Later
    /// calls do nothing.
    pub fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Ok(());
        }
        state.closed = true;

        let errors = state
            .loggers
            .iter()
            .flatten()
            .filter_map(|sink| sink.close().err())
            .map(ProcessError::Io)
            .collect();
        ProcessError::from_many(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::InMemorySink;

    fn memory() -> Arc<dyn LogSink> {
        Arc::new(InMemorySink::new(10))
    }

    #[test]
    fn test_default_is_valid_and_discards() {
        let opts = OutputOptions::default();
        assert!(opts.validate().is_ok());
        assert!(opts.get_output().is_discard());
        assert!(opts.get_error().is_discard());
    }

    #[test]
    fn test_suppress_defined_stream_rejected() {
        let opts = OutputOptions {
            output: Some(memory()),
            suppress_output: true,
            ..Default::default()
        };
        assert!(opts.validate().is_err());
    }

    #[test]
    fn test_same_sink_for_both_streams_rejected() {
        let sink = memory();
        let opts = OutputOptions {
            output: Some(Arc::clone(&sink)),
            error: Some(sink),
            ..Default::default()
        };
        assert!(opts.validate().is_err());

        let opts = OutputOptions {
            output: Some(memory()),
            error: Some(memory()),
            ..Default::default()
        };
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_redirect_rules() {
        let opts = OutputOptions {
            send_output_to_error: true,
            ..Default::default()
        };
        assert!(opts.validate().is_err());

        let opts = OutputOptions {
            error: Some(memory()),
            send_output_to_error: true,
            ..Default::default()
        };
        assert!(opts.validate().is_ok());

        let opts = OutputOptions {
            output: Some(memory()),
            error: Some(memory()),
            send_output_to_error: true,
            send_error_to_output: true,
            ..Default::default()
        };
        assert!(opts.validate().is_err());

        let opts = OutputOptions {
            error: Some(memory()),
            suppress_output: true,
            send_output_to_error: true,
            ..Default::default()
        };
        assert!(opts.validate().is_err());
    }

    #[test]
    fn test_writers_are_memoized() {
        let opts = OutputOptions::in_memory(10);
        let first = opts.get_output();
        let second = opts.get_output();
        assert!(first.same_as(&second));
        assert!(!first.same_as(&opts.get_error()));
    }

    #[test]
    fn test_redirect_shares_writer() {
        let opts = OutputOptions {
            error: Some(memory()),
            send_output_to_error: true,
            ..Default::default()
        };
        assert!(opts.get_output().same_as(&opts.get_error()));
    }

    #[test]
    fn test_in_memory_lines_collects_both_streams() {
        let opts = OutputOptions::in_memory(10);
        opts.get_output().write(b"out\n").unwrap();
        opts.get_error().write(b"err\n").unwrap();
        assert_eq!(opts.in_memory_lines(10).unwrap(), vec!["out", "err"]);
    }

    #[test]
    fn test_close_is_idempotent() {
        let opts = OutputOptions::in_memory(10);
        opts.get_output();
        assert!(opts.close().is_ok());
        assert!(opts.close().is_ok());
    }

    #[test]
    fn test_detached_does_not_share_writers() {
        let opts = OutputOptions::in_memory(10);
        let detached = opts.detached();
        assert_eq!(opts, detached);
        assert!(!opts.get_output().same_as(&detached.get_output()));
    }
}
