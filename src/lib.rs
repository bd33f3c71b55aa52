#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

pub mod changed;
pub mod cli;
pub mod config;
mod error;
pub mod logging;
pub mod matcher;
pub mod pipeline;
pub mod scaffold;
pub mod task;
pub mod watch;

pub use crate::config::{Mode, Project};
pub use crate::error::*;
pub use crate::matcher::FileSet;
pub use crate::pipeline::{Pipeline, Registry, RunReport, Step, TaskId};
pub use crate::task::{Context, Summary, Task, TaskResult};
