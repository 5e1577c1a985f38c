//! Process creation options

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::error::{ProcessError, Result};
use crate::options::output::{OutputOptions, OutputWriter};

/// Shortest non-zero timeout a process may be given.
pub const MIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Callback run once when the owning process completes or its manager closes.
pub type Closer = Box<dyn FnOnce() -> io::Result<()> + Send>;

/// Ordered closers attached to a set of options.
///
/// Closers are bound to the process that was created from the options: a
/// clone of the options starts with no closers, and closers never serialize.
#[derive(Default)]
pub struct Closers {
    inner: Mutex<Vec<Closer>>,
}

impl Closers {
    /// Append a closer.
    pub fn push(&self, closer: Closer) {
        self.inner.lock().push(closer);
    }

    /// Move every closer out, leaving this list empty.
    pub fn take(&self) -> Closers {
        Closers {
            inner: Mutex::new(std::mem::take(&mut *self.inner.lock())),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run every closer in registration order. Each closer runs at most once
    /// no matter how often this is called.
    pub fn close(&self) -> Result<()> {
        let closers = std::mem::take(&mut *self.inner.lock());
        let errors = closers
            .into_iter()
            .filter_map(|closer| closer().err())
            .map(ProcessError::Io)
            .collect();
        ProcessError::from_many(errors)
    }
}

impl Clone for Closers {
    fn clone(&self) -> Self {
        Closers::default()
    }
}

impl PartialEq for Closers {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl fmt::Debug for Closers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Closers({})", self.len())
    }
}

/// Which process implementation to construct.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessImplementation {
    /// Non-blocking process with a background waiter.
    #[default]
    Basic,
    /// Reactor process whose task owns the child handle.
    Blocking,
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}

/// Everything needed to start a process.
///
/// `timeout` is the canonical deadline; it travels as whole seconds in the
/// `timeout_secs` field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateOptions {
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub environment: HashMap<String, String>,
    #[serde(default)]
    pub override_environ: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<PathBuf>,
    #[serde(default, rename = "timeout_secs", with = "duration_secs")]
    pub timeout: Duration,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub output: OutputOptions,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_success: Vec<CreateOptions>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_failure: Vec<CreateOptions>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_timeout: Vec<CreateOptions>,
    #[serde(default)]
    pub implementation: ProcessImplementation,
    #[serde(default)]
    pub synchronized: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standard_input_bytes: Option<Vec<u8>>,
    #[serde(skip)]
    closers: Closers,
}

/// A launchable command plus the writers its pumps feed.
#[derive(Debug)]
pub struct ResolvedCommand {
    pub command: Command,
    pub stdout: OutputWriter,
    pub stderr: OutputWriter,
    pub stdin: Option<Vec<u8>>,
}

impl CreateOptions {
    /// Options running `args`.
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Options from a whitespace-separated command line.
    pub fn from_command_line(command_line: &str) -> Self {
        Self::new(command_line.split_whitespace())
    }

    /// Set the working directory
    pub fn working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    /// Set the timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Add a tag
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Select the implementation
    pub fn implementation(mut self, implementation: ProcessImplementation) -> Self {
        self.implementation = implementation;
        self
    }

    /// Set the output policy
    pub fn output(mut self, output: OutputOptions) -> Self {
        self.output = output;
        self
    }

    /// Bytes written to the child's stdin before it is closed
    pub fn standard_input(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.standard_input_bytes = Some(bytes.into());
        self
    }

    /// Add or replace an environment variable.
    pub fn add_env_var(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.environment.insert(key.into(), value.into());
    }

    /// Attach a closer that runs when the process built from these options
    /// finishes.
    pub fn register_closer<F>(&self, closer: F)
    where
        F: FnOnce() -> io::Result<()> + Send + 'static,
    {
        self.closers.push(Box::new(closer));
    }

    /// Move the closers out of these options.
    pub fn take_closers(&self) -> Closers {
        self.closers.take()
    }

    /// Run the closers still attached to these options.
    pub fn close(&self) -> Result<()> {
        self.closers.close()
    }

    /// Whether any follow-up process is configured.
    pub fn has_follow_ups(&self) -> bool {
        !(self.on_success.is_empty() && self.on_failure.is_empty() && self.on_timeout.is_empty())
    }

    /// Check these options and every follow-up.
    pub fn validate(&self) -> Result<()> {
        if self.args.is_empty() || self.args[0].is_empty() {
            return Err(ProcessError::InvalidInput(
                "cannot have empty args".to_string(),
            ));
        }

        if !self.timeout.is_zero() && self.timeout < MIN_TIMEOUT {
            return Err(ProcessError::InvalidInput(format!(
                "timeout must be zero or at least {}s, got {:?}",
                MIN_TIMEOUT.as_secs(),
                self.timeout
            )));
        }

        if let Some(dir) = &self.working_directory {
            let metadata = std::fs::metadata(dir).map_err(|e| {
                ProcessError::InvalidInput(format!(
                    "could not stat working directory '{}': {}",
                    dir.display(),
                    e
                ))
            })?;
            if !metadata.is_dir() {
                return Err(ProcessError::InvalidInput(format!(
                    "working directory '{}' is not a directory",
                    dir.display()
                )));
            }
        }

        self.output.validate()?;

        for follow_up in self
            .on_success
            .iter()
            .chain(&self.on_failure)
            .chain(&self.on_timeout)
        {
            follow_up.validate()?;
        }

        Ok(())
    }

    /// Materialize a command ready to spawn.
    ///
    /// Streams whose writer discards are not piped. Closing the output
    /// sinks is registered as a closer.
    pub fn resolve(&self) -> Result<ResolvedCommand> {
        self.validate()?;

        let mut command = Command::new(&self.args[0]);
        command.args(&self.args[1..]);

        if self.override_environ {
            command.env_clear();
        }
        command.envs(&self.environment);

        if let Some(dir) = &self.working_directory {
            command.current_dir(dir);
        }

        #[cfg(unix)]
        command.process_group(0);

        let stdout = self.output.get_output();
        let stderr = self.output.get_error();

        command.stdin(if self.standard_input_bytes.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        command.stdout(if stdout.is_discard() {
            Stdio::null()
        } else {
            Stdio::piped()
        });
        command.stderr(if stderr.is_discard() {
            Stdio::null()
        } else {
            Stdio::piped()
        });
        command.kill_on_drop(true);

        let output = self.output.clone();
        self.register_closer(move || {
            output
                .close()
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
        });

        Ok(ResolvedCommand {
            command,
            stdout,
            stderr,
            stdin: self.standard_input_bytes.clone(),
        })
    }
}
