//! Publish steps backed by the filesystem, the configured site command and
//! git.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use inscript_common::{StepError, WorkspaceConfig};
use inscript_editor_sync::{FileDraftStore, FilePostSource, PublishContext, PublishOps};
use tokio::process::Command;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct ShellPublisher {
    posts: FilePostSource,
    drafts: FileDraftStore,
    project_root: PathBuf,
    publish_command: String,
}

impl ShellPublisher {
    pub fn new(config: &WorkspaceConfig) -> Self {
        Self {
            posts: FilePostSource::new(&config.posts_dir),
            drafts: FileDraftStore::new(&config.drafts_dir),
            project_root: config.project_root.clone(),
            publish_command: config.publish_command.clone(),
        }
    }
}

impl PublishOps for ShellPublisher {
    async fn save_record(&self, context: &PublishContext) -> Result<Option<String>, StepError> {
        self.posts
            .save_record(
                &self.drafts,
                &context.post_id,
                &context.frontmatter,
                &context.content,
            )
            .await?;
        Ok(Some(format!(
            "saved {}",
            self.posts.root().join(context.post_id.as_str()).display()
        )))
    }

    async fn publish_site(&self) -> Result<Option<String>, StepError> {
        let output = run("sh", &["-c", self.publish_command.as_str()], &self.project_root).await?;
        Ok(non_empty(output))
    }

    async fn commit_changes(&self, message: &str) -> Result<Option<String>, StepError> {
        run("git", &["add", "."], &self.project_root).await?;
        match run("git", &["commit", "-m", message], &self.project_root).await {
            Ok(output) => Ok(non_empty(output)),
            Err(err) if nothing_to_commit(&err.message) => {
                info!("working tree clean, nothing to commit");
                Ok(Some("nothing to commit".to_string()))
            }
            Err(err) => Err(err),
        }
    }

    async fn push_to_remote(&self) -> Result<Option<String>, StepError> {
        let output = run("git", &["push"], &self.project_root).await?;
        Ok(non_empty(output))
    }
}

/// Run `program` in `cwd` and collect stdout and stderr. A non-zero exit is
/// an error carrying that output.
async fn run(program: &str, args: &[&str], cwd: &Path) -> Result<String, StepError> {
    debug!(program, ?args, cwd = %cwd.display(), "running command");
    let output = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| StepError::new(format!("failed to run {program}: {e}")))?;

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));

    if output.status.success() {
        Ok(text)
    } else {
        Err(StepError::new(format!(
            "{program} exited with {}: {}",
            output.status,
            text.trim()
        )))
    }
}

fn nothing_to_commit(output: &str) -> bool {
    output.contains("nothing to commit") || output.contains("no changes added to commit")
}

fn non_empty(output: String) -> Option<String> {
    let trimmed = output.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use inscript_editor_sync::{Frontmatter, PublishWorkflow, WorkflowPreset, WorkflowStatus};

    use super::*;

    fn config(root: &Path, publish_command: &str) -> WorkspaceConfig {
        WorkspaceConfig {
            posts_dir: root.join("posts"),
            drafts_dir: root.join("drafts"),
            project_root: root.to_path_buf(),
            publish_command: publish_command.to_string(),
            allow_push: false,
        }
    }

    fn context() -> PublishContext {
        PublishContext {
            post_id: "hello.md".into(),
            frontmatter: Frontmatter {
                title: "Hello".into(),
                ..Default::default()
            },
            content: "<p>hi</p>".into(),
        }
    }

    #[test]
    fn test_nothing_to_commit_detection() {
        assert!(nothing_to_commit(
            "git exited with exit status: 1: On branch main\nnothing to commit, working tree clean"
        ));
        assert!(!nothing_to_commit("fatal: not a git repository"));
    }

    #[test]
    fn test_non_empty_trims() {
        assert_eq!(non_empty("  \n".into()), None);
        assert_eq!(non_empty(" done\n".into()), Some("done".into()));
    }

    #[tokio::test]
    async fn test_run_reports_failure_output() {
        let dir = tempfile::tempdir().unwrap();
        let err = run("sh", &["-c", "echo broken >&2; exit 3"], dir.path())
            .await
            .unwrap_err();
        assert!(err.message.contains("broken"));

        let ok = run("sh", &["-c", "echo built"], dir.path()).await.unwrap();
        assert_eq!(ok.trim(), "built");
    }

    #[tokio::test]
    async fn test_save_and_publish_workflow() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("posts")).unwrap();
        let publisher = ShellPublisher::new(&config(dir.path(), "echo site built"));

        let mut workflow =
            PublishWorkflow::from_preset(publisher, context(), WorkflowPreset::SaveAndPublish, false)
                .unwrap();
        let state = workflow.run().await;
        assert_eq!(state.status, WorkflowStatus::Completed);
        assert_eq!(state.outputs[1].output.as_deref(), Some("site built"));

        let saved = std::fs::read_to_string(dir.path().join("posts/hello.md")).unwrap();
        assert!(saved.contains("title: Hello"));
        assert!(saved.contains("<p>hi</p>"));
    }

    #[tokio::test]
    async fn test_failing_publish_command_stops_workflow() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("posts")).unwrap();
        let publisher = ShellPublisher::new(&config(dir.path(), "exit 1"));

        let mut workflow =
            PublishWorkflow::from_preset(publisher, context(), WorkflowPreset::SaveAndPublish, false)
                .unwrap();
        let state = workflow.run().await;
        assert_eq!(state.status, WorkflowStatus::Error);
        assert_eq!(state.current_index, 1);
    }
}
