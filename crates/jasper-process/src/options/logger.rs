//! Logger specifications and their sink configuration

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ProcessError, Result};
use crate::sink::{FileSink, HttpSink, HttpTarget, InMemorySink, InheritSink, LogSink, TracingSink};

/// Default number of lines kept by an in-memory logger.
pub const DEFAULT_IN_MEMORY_CAPACITY: usize = 1000;

/// Connection parameters shared by both buildlogger protocol versions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildloggerOptions {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub build_id: String,
    #[serde(default)]
    pub test_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultLoggerOptions {
    #[serde(default)]
    pub prefix: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileLoggerOptions {
    pub filename: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InheritLoggerOptions {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplunkLoggerOptions {
    pub url: String,
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SumologicLoggerOptions {
    pub sumo_endpoint: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InMemoryLoggerOptions {
    #[serde(default = "default_in_memory_capacity")]
    pub in_memory_cap: usize,
}

impl Default for InMemoryLoggerOptions {
    fn default() -> Self {
        Self {
            in_memory_cap: DEFAULT_IN_MEMORY_CAPACITY,
        }
    }
}

fn default_in_memory_capacity() -> usize {
    DEFAULT_IN_MEMORY_CAPACITY
}

/// A tagged logger specification: the type selects which options apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "options")]
pub enum LoggerSpec {
    #[serde(rename = "buildloggerv2")]
    BuildloggerV2(BuildloggerOptions),
    #[serde(rename = "buildloggerv3")]
    BuildloggerV3(BuildloggerOptions),
    #[serde(rename = "default")]
    Default(DefaultLoggerOptions),
    #[serde(rename = "file")]
    File(FileLoggerOptions),
    #[serde(rename = "inherit")]
    Inherit(InheritLoggerOptions),
    #[serde(rename = "splunk")]
    Splunk(SplunkLoggerOptions),
    #[serde(rename = "sumologic")]
    Sumologic(SumologicLoggerOptions),
    #[serde(rename = "in-memory")]
    InMemory(InMemoryLoggerOptions),
}

impl LoggerSpec {
    /// Name of the logger type as it appears on the wire.
    pub fn type_name(&self) -> &'static str {
        match self {
            LoggerSpec::BuildloggerV2(_) => "buildloggerv2",
            LoggerSpec::BuildloggerV3(_) => "buildloggerv3",
            LoggerSpec::Default(_) => "default",
            LoggerSpec::File(_) => "file",
            LoggerSpec::Inherit(_) => "inherit",
            LoggerSpec::Splunk(_) => "splunk",
            LoggerSpec::Sumologic(_) => "sumologic",
            LoggerSpec::InMemory(_) => "in-memory",
        }
    }

    /// Check that the per-type options carry what configuration needs.
    pub fn validate(&self) -> Result<()> {
        let problem = match self {
            LoggerSpec::BuildloggerV2(opts) | LoggerSpec::BuildloggerV3(opts) => {
                opts.url.is_empty().then_some("buildlogger url must be set")
            }
            LoggerSpec::Default(_) | LoggerSpec::Inherit(_) => None,
            LoggerSpec::File(opts) => opts
                .filename
                .as_os_str()
                .is_empty()
                .then_some("file logger requires a filename"),
            LoggerSpec::Splunk(opts) => (opts.url.is_empty() || opts.token.is_empty())
                .then_some("splunk logger requires a url and a token"),
            LoggerSpec::Sumologic(opts) => opts
                .sumo_endpoint
                .is_empty()
                .then_some("sumologic logger requires an endpoint"),
            LoggerSpec::InMemory(opts) => (opts.in_memory_cap == 0)
                .then_some("in-memory logger capacity must be positive"),
        };

        match problem {
            Some(message) => Err(ProcessError::InvalidInput(message.to_string())),
            None => Ok(()),
        }
    }

    /// Produce the sink this specification describes.
    pub fn configure(&self) -> Result<Arc<dyn LogSink>> {
        self.validate()?;

        let sink: Arc<dyn LogSink> = match self {
            LoggerSpec::BuildloggerV2(_) | LoggerSpec::BuildloggerV3(_) => {
                return Err(ProcessError::Unsupported(format!(
                    "no client for logger type '{}'",
                    self.type_name()
                )))
            }
            LoggerSpec::Default(opts) => Arc::new(TracingSink::new(opts.prefix.clone())),
            LoggerSpec::File(opts) => Arc::new(FileSink::open(&opts.filename)?),
            LoggerSpec::Inherit(_) => Arc::new(InheritSink),
            LoggerSpec::Splunk(opts) => Arc::new(HttpSink::spawn(HttpTarget::Splunk {
                url: opts.url.clone(),
                token: opts.token.clone(),
                channel: opts.channel.clone(),
            })?),
            LoggerSpec::Sumologic(opts) => Arc::new(HttpSink::spawn(HttpTarget::Sumologic {
                endpoint: opts.sumo_endpoint.clone(),
            })?),
            LoggerSpec::InMemory(opts) => Arc::new(InMemorySink::new(opts.in_memory_cap)),
        };

        Ok(sink)
    }
}
