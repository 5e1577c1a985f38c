//! Options describing how a process is created and where its output goes

pub mod create;
pub mod logger;
pub mod output;

pub use create::{Closer, Closers, CreateOptions, ProcessImplementation, ResolvedCommand, MIN_TIMEOUT};
pub use logger::{
    BuildloggerOptions, DefaultLoggerOptions, FileLoggerOptions, InMemoryLoggerOptions,
    InheritLoggerOptions, LoggerSpec, SplunkLoggerOptions, SumologicLoggerOptions,
    DEFAULT_IN_MEMORY_CAPACITY,
};
pub use output::{OutputOptions, OutputWriter};
