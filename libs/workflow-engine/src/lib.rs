//! Workflow execution engine.
//!
//! Parses and validates a [`pcore_domain::WorkflowDecl`], resolves its
//! `${...}` expressions, and drives its steps to completion through a
//! pluggable [`executor::StepExecutor`] registry, a concurrency-limiting
//! [`scheduler::Scheduler`], and a buffered [`log_stream::LogStream`].

pub mod cancellation;
pub mod engine;
pub mod executor;
pub mod interpolation;
pub mod log_stream;
pub mod parser;
pub mod scheduler;

pub use cancellation::{cancellation_pair, CancellationHandle, CancellationRegistry, CancellationToken};
pub use engine::{EngineConfig, EngineError, WorkflowEngine};
pub use executor::{ExecutorError, ExecutorRegistry, StepContext, StepExecutor, StepLogWriter, StepOutputs};
pub use interpolation::{InterpolationContext, InterpolationError, ResourceView};
pub use log_stream::{LogChunk, LogStream, LogStreamError, StepLogHandle};
pub use parser::{parse_and_validate, validate_workflow, ParseError, ValidationError, WorkflowParseOrValidationError};
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerError};
