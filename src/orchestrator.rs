//! Submit, wait, list: one call per extraction.

use std::fmt;

use crate::error::Error;
use crate::files::{FileDescriptor, FileLister};
use crate::poll::{NoProgress, ProgressObserver, TaskStatusPoller, TerminalStatus};
use crate::submit::TaskSubmitter;
use crate::task::{TaskHandle, TaskSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Submit,
    Poll,
    Processing,
    Listing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Submit => "submit",
            Stage::Poll => "poll",
            Stage::Processing => "processing",
            Stage::Listing => "listing",
        })
    }
}

/// A failed run, tagged with the stage that failed. `task` is set once the
/// service has assigned an id.
#[derive(Debug, thiserror::Error)]
#[error("{stage} stage failed: {source}")]
pub struct OrchestrationError {
    pub stage: Stage,
    pub task: Option<TaskHandle>,
    #[source]
    pub source: Error,
}

impl OrchestrationError {
    fn new(stage: Stage, task: Option<&TaskHandle>, source: Error) -> Self {
        Self {
            stage,
            task: task.cloned(),
            source,
        }
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedTask {
    pub handle: TaskHandle,
    /// May be empty: the task succeeded but produced nothing.
    pub files: Vec<FileDescriptor>,
}

pub struct TaskOrchestrator {
    submitter: TaskSubmitter,
    poller: TaskStatusPoller,
    lister: FileLister,
}

impl TaskOrchestrator {
    pub fn new(submitter: TaskSubmitter, poller: TaskStatusPoller, lister: FileLister) -> Self {
        Self {
            submitter,
            poller,
            lister,
        }
    }

    pub fn submitter(&self) -> &TaskSubmitter {
        &self.submitter
    }

    pub fn poller(&self) -> &TaskStatusPoller {
        &self.poller
    }

    pub fn run(&self, spec: &TaskSpec) -> Result<Vec<FileDescriptor>, OrchestrationError> {
        self.run_with_observer(spec, &mut NoProgress)
    }

    pub fn run_with_observer(
        &self,
        spec: &TaskSpec,
        observer: &mut dyn ProgressObserver,
    ) -> Result<Vec<FileDescriptor>, OrchestrationError> {
        self.execute(spec, observer).map(|done| done.files)
    }

    /// Each call creates a new remote task; nothing carries over between runs.
    pub fn execute(
        &self,
        spec: &TaskSpec,
        observer: &mut dyn ProgressObserver,
    ) -> Result<CompletedTask, OrchestrationError> {
        let handle = self
            .submitter
            .submit(spec)
            .map_err(|e| OrchestrationError::new(Stage::Submit, None, e))?;

        match self.poller.await_completion(&handle, observer) {
            Ok(TerminalStatus::Done) => {}
            Ok(TerminalStatus::Failed { status }) => {
                return Err(OrchestrationError::new(
                    Stage::Processing,
                    Some(&handle),
                    Error::RemoteProcessingFailed {
                        task_id: handle.to_string(),
                        status,
                    },
                ));
            }
            Err(e) => return Err(OrchestrationError::new(Stage::Poll, Some(&handle), e)),
        }

        let files = self
            .lister
            .list_files(&handle)
            .map_err(|e| OrchestrationError::new(Stage::Listing, Some(&handle), e))?;
        if files.is_empty() {
            log::info!("task {} finished without producing files", handle);
        }
        Ok(CompletedTask { handle, files })
    }
}
