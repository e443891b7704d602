//! Automation around the `snfsdefrag` utility: flag assembly and execution,
//! output parsing, and a durable batch worklist drained outside business hours.

pub mod batch;
pub mod config;
pub mod error;
pub mod invoker;
pub mod json_output;
pub mod logging;
pub mod parser;
pub mod schedule;
pub mod worklist;

pub use batch::{BatchReport, BatchScheduler, BatchState, DefragDispatcher, Dispatch};
pub use config::{Config, ConfigBuilder};
pub use error::{DefragError, Result};
pub use invoker::{DefragOptions, ExecutionResult, Invoker};
pub use parser::{CandidateRecord, ExtentCount, ExtentListing, ExtentRecord, OutputMode, Response};
pub use worklist::Worklist;
