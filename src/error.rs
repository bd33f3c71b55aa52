use std::sync::mpsc::{RecvError, SendError};

pub use anyhow::Error as RuntimeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DandoriError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Couldn't convert path to UTF-8.\n{0}")]
    PathFormat(#[from] camino::FromPathBufError),

    #[error(transparent)]
    Match(#[from] MatchError),

    #[error("Error while running the pipeline.\n{0}")]
    Pipeline(#[from] PipelineError),

    #[error("Error while watching for file changes:\n{0}")]
    Watch(#[from] WatchError),

    #[error("Error while scaffolding:\n{0}")]
    Scaffold(#[from] ScaffoldError),
}

#[derive(Debug, Error)]
pub enum MatchError {
    #[error("Couldn't compile glob pattern.\n{0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Couldn't convert path to UTF-8.\n{0}")]
    PathFormat(#[from] camino::FromPathBufError),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Pipeline '{0}' references unregistered task '{1}'")]
    Unregistered(&'static str, &'static str),

    #[error("Pipeline '{0}' contains an ordering cycle")]
    Cycle(&'static str),

    #[error("Pipeline '{0}' lost its result channel")]
    Disconnected(&'static str),

    #[error("Task '{0}':\n{1}")]
    Task(&'static str, anyhow::Error),
}

#[derive(Debug, Error)]
pub enum WatchError {
    #[error(transparent)]
    Notify(#[from] notify::Error),

    #[error(transparent)]
    Recv(#[from] RecvError),

    #[error(transparent)]
    Send(#[from] SendError<()>),

    #[error("Task '{0}' has no watchable input profile")]
    NotWatchable(&'static str),
}

#[derive(Debug, Error)]
pub enum ScaffoldError {
    #[error("Template directory '{0}' does not exist")]
    TemplateMissing(camino::Utf8PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
