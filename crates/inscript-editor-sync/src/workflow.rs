//! User-triggered deploy sequences: save, publish, commit, push.
//!
//! A workflow runs one step at a time. The commit step waits for a message;
//! any failure is terminal for the instance and nothing is retried.

use std::fmt;
use std::future::Future;

use inscript_common::{StepError, WorkflowError};
use smol_str::SmolStr;
use tracing::{error, info};

use crate::posts::Frontmatter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkflowStep {
    Save,
    Publish,
    Commit,
    Push,
}

impl WorkflowStep {
    pub fn name(self) -> &'static str {
        match self {
            Self::Save => "save",
            Self::Publish => "publish",
            Self::Commit => "commit",
            Self::Push => "push",
        }
    }
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowStatus {
    Active,
    /// Waiting for a commit message.
    Paused,
    Completed,
    /// A step failed. Terminal.
    Error,
}

/// The canned step sequences offered to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowPreset {
    SaveAndPublish,
    SavePublishCommit,
    SavePublishCommitPush,
}

impl WorkflowPreset {
    /// Presets the user may pick; the push preset only when pushing is
    /// allowed.
    pub fn available(allow_push: bool) -> Vec<Self> {
        let mut presets = vec![Self::SaveAndPublish, Self::SavePublishCommit];
        if allow_push {
            presets.push(Self::SavePublishCommitPush);
        }
        presets
    }

    pub fn steps(self) -> Vec<WorkflowStep> {
        use WorkflowStep::*;
        match self {
            Self::SaveAndPublish => vec![Save, Publish],
            Self::SavePublishCommit => vec![Save, Publish, Commit],
            Self::SavePublishCommitPush => vec![Save, Publish, Commit, Push],
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::SaveAndPublish => "Save & Publish",
            Self::SavePublishCommit => "Save, Publish & Commit",
            Self::SavePublishCommitPush => "Save, Publish, Commit & Push",
        }
    }
}

/// What the save step writes.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishContext {
    pub post_id: SmolStr,
    pub frontmatter: Frontmatter,
    pub content: String,
}

/// The external side effects behind each step. Each returns the command
/// output, if any.
pub trait PublishOps: Send + Sync {
    fn save_record(
        &self,
        context: &PublishContext,
    ) -> impl Future<Output = Result<Option<String>, StepError>> + Send;

    fn publish_site(&self) -> impl Future<Output = Result<Option<String>, StepError>> + Send;

    fn commit_changes(
        &self,
        message: &str,
    ) -> impl Future<Output = Result<Option<String>, StepError>> + Send;

    fn push_to_remote(&self) -> impl Future<Output = Result<Option<String>, StepError>> + Send;
}

/// Output of a completed step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutput {
    pub step: WorkflowStep,
    pub output: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowState {
    pub steps: Vec<WorkflowStep>,
    pub current_index: usize,
    pub status: WorkflowStatus,
    pub error: Option<String>,
    pub failed_step: Option<WorkflowStep>,
    pub commit_message: Option<String>,
    pub outputs: Vec<StepOutput>,
}

impl WorkflowState {
    fn new(steps: Vec<WorkflowStep>) -> Self {
        let status = if steps.is_empty() {
            WorkflowStatus::Completed
        } else {
            WorkflowStatus::Active
        };
        Self {
            steps,
            current_index: 0,
            status,
            error: None,
            failed_step: None,
            commit_message: None,
            outputs: Vec::new(),
        }
    }

    pub fn current_step(&self) -> Option<WorkflowStep> {
        self.steps.get(self.current_index).copied()
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.status, WorkflowStatus::Completed | WorkflowStatus::Error)
    }

    /// The failure as an error value, when the workflow failed.
    pub fn failure(&self) -> Option<WorkflowError> {
        match (self.failed_step, &self.error) {
            (Some(step), Some(message)) => Some(WorkflowError::StepFailed {
                step: step.name().into(),
                message: message.clone(),
            }),
            _ => None,
        }
    }
}

pub struct PublishWorkflow<O> {
    ops: O,
    context: PublishContext,
    state: WorkflowState,
}

impl<O: PublishOps> PublishWorkflow<O> {
    /// Plan `steps` against `context`. A push step is refused unless
    /// `allow_push` is set.
    pub fn new(
        ops: O,
        context: PublishContext,
        steps: Vec<WorkflowStep>,
        allow_push: bool,
    ) -> Result<Self, WorkflowError> {
        if !allow_push && steps.contains(&WorkflowStep::Push) {
            return Err(WorkflowError::PushDisabled);
        }
        info!(
            post_id = %context.post_id,
            steps = ?steps,
            "workflow started"
        );
        Ok(Self {
            ops,
            context,
            state: WorkflowState::new(steps),
        })
    }

    pub fn from_preset(
        ops: O,
        context: PublishContext,
        preset: WorkflowPreset,
        allow_push: bool,
    ) -> Result<Self, WorkflowError> {
        Self::new(ops, context, preset.steps(), allow_push)
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn context(&self) -> &PublishContext {
        &self.context
    }

    pub fn ops(&self) -> &O {
        &self.ops
    }

    /// Provide the commit message. Resumes a paused workflow; before the
    /// commit step is reached the message is simply kept for later. Blank
    /// messages are rejected and leave the workflow as it was.
    pub fn supply_commit_message(&mut self, message: impl Into<String>) -> Result<(), WorkflowError> {
        let message = message.into();
        if message.trim().is_empty() {
            return Err(WorkflowError::EmptyCommitMessage);
        }
        match self.state.status {
            WorkflowStatus::Paused => {
                self.state.commit_message = Some(message);
                self.state.status = WorkflowStatus::Active;
                info!("commit message supplied, resuming workflow");
                Ok(())
            }
            WorkflowStatus::Active => {
                self.state.commit_message = Some(message);
                Ok(())
            }
            WorkflowStatus::Completed | WorkflowStatus::Error => Err(WorkflowError::NotPaused),
        }
    }

    /// Drop `steps[index..]` from the plan.
    ///
    /// Steps that have already run cannot be removed. `current_index` always
    /// names a step that has not begun: it only advances once a step
    /// completes, and a step runs entirely inside [`step`](Self::step).
    pub fn cancel_from(&mut self, index: usize) -> Result<(), WorkflowError> {
        let current = self.state.current_index;
        if self.state.is_finished() || index < current {
            return Err(WorkflowError::InvalidCancel { index, current });
        }

        self.state.steps.truncate(index);
        info!(remaining = ?self.state.steps, "workflow steps cancelled");
        if self.state.current_index >= self.state.steps.len() {
            self.state.status = WorkflowStatus::Completed;
            info!("workflow completed");
        }
        Ok(())
    }

    /// Execute the current step, if the workflow is active.
    pub async fn step(&mut self) -> &WorkflowState {
        if self.state.status != WorkflowStatus::Active {
            return &self.state;
        }
        let Some(step) = self.state.current_step() else {
            self.state.status = WorkflowStatus::Completed;
            return &self.state;
        };

        let result = match step {
            WorkflowStep::Commit => match self.state.commit_message.clone() {
                Some(message) => self.ops.commit_changes(&message).await,
                None => {
                    info!("workflow paused for commit message");
                    self.state.status = WorkflowStatus::Paused;
                    return &self.state;
                }
            },
            WorkflowStep::Save => self.ops.save_record(&self.context).await,
            WorkflowStep::Publish => self.ops.publish_site().await,
            WorkflowStep::Push => self.ops.push_to_remote().await,
        };

        match result {
            Ok(output) => {
                info!(%step, "workflow step completed");
                self.state.outputs.push(StepOutput { step, output });
                self.state.current_index += 1;
                if self.state.current_index >= self.state.steps.len() {
                    self.state.status = WorkflowStatus::Completed;
                    info!("workflow completed");
                }
            }
            Err(err) => {
                error!(%step, error = %err, "workflow step failed");
                self.state.status = WorkflowStatus::Error;
                self.state.failed_step = Some(step);
                self.state.error = Some(err.message);
            }
        }
        &self.state
    }

    /// Run steps until the workflow pauses, completes or fails.
    pub async fn run(&mut self) -> &WorkflowState {
        while self.state.status == WorkflowStatus::Active {
            self.step().await;
        }
        &self.state
    }
}

impl<O> fmt::Debug for PublishWorkflow<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublishWorkflow")
            .field("context", &self.context)
            .field("state", &self.state)
            .finish()
    }
}
