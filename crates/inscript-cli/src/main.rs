use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use inscript_common::telemetry::{self, TelemetryConfig};
use inscript_common::{EditorConfig, WorkflowError, WorkspaceConfig};
use inscript_editor_core::render_unified;
use inscript_editor_sync::{
    EditorSession, FileDraftStore, FilePostSource, HeadlessSurface, PublishWorkflow,
    SessionHandle, SessionView, WorkflowPreset, WorkflowStatus,
};
use miette::{IntoDiagnostic, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::Level;

mod publisher;

use publisher::ShellPublisher;

#[derive(Parser)]
#[command(version, about = "inscript - draft history and publishing for markdown blog posts", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Directory holding published posts
    #[arg(long, global = true)]
    posts: Option<PathBuf>,

    /// Directory holding draft records
    #[arg(long, global = true)]
    drafts: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List posts, including draft-only ones
    List,
    /// Show a post's draft history
    History { post: String },
    /// Step the draft cursor back one entry
    Undo { post: String },
    /// Step the draft cursor forward one entry
    Redo { post: String },
    /// Move the draft cursor to an entry
    Restore { post: String, index: usize },
    /// Diff the published version against a draft entry
    Diff {
        post: String,
        /// Entry to compare (default: the cursor)
        index: Option<usize>,
    },
    /// Delete a post's draft record
    Discard { post: String },
    /// Delete a post file together with its draft record
    Delete {
        post: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Save the entry at the cursor and run the publish steps
    Deploy {
        post: String,

        #[arg(long, value_enum, default_value_t = Preset::SavePublishCommit)]
        preset: Preset,

        /// Commit message (prompted for when omitted)
        #[arg(short, long)]
        message: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Preset {
    SavePublish,
    SavePublishCommit,
    SavePublishCommitPush,
}

impl From<Preset> for WorkflowPreset {
    fn from(preset: Preset) -> Self {
        match preset {
            Preset::SavePublish => WorkflowPreset::SaveAndPublish,
            Preset::SavePublishCommit => WorkflowPreset::SavePublishCommit,
            Preset::SavePublishCommitPush => WorkflowPreset::SavePublishCommitPush,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_miette();
    if let Err(err) = dotenvy::dotenv() {
        if !err.not_found() {
            return Err(err).into_diagnostic();
        }
    }

    let cli = Cli::parse();
    let mut telemetry_config = TelemetryConfig::from_env("inscript-cli");
    if cli.verbose {
        telemetry_config = telemetry_config.with_level(Level::DEBUG).verbose(true);
    }
    telemetry::init(telemetry_config);

    let mut workspace = WorkspaceConfig::from_env()?;
    if let Some(posts) = cli.posts {
        workspace.posts_dir = posts;
    }
    if let Some(drafts) = cli.drafts {
        workspace.drafts_dir = drafts;
    }
    let app = App::new(workspace, EditorConfig::from_env()?);

    match cli.command {
        Commands::List => app.list().await,
        Commands::History { post } => app.history(&post).await,
        Commands::Undo { post } => app.navigate(&post, Move::Undo).await,
        Commands::Redo { post } => app.navigate(&post, Move::Redo).await,
        Commands::Restore { post, index } => app.navigate(&post, Move::Restore(index)).await,
        Commands::Diff { post, index } => app.diff(&post, index).await,
        Commands::Discard { post } => app.discard(&post).await,
        Commands::Delete { post, yes } => app.delete(&post, yes).await,
        Commands::Deploy {
            post,
            preset,
            message,
        } => app.deploy(&post, preset.into(), message).await,
    }
}

#[derive(Debug, Clone, Copy)]
enum Move {
    Undo,
    Redo,
    Restore(usize),
}

struct App {
    workspace: WorkspaceConfig,
    editor: EditorConfig,
    posts: FilePostSource,
    drafts: FileDraftStore,
}

impl App {
    fn new(workspace: WorkspaceConfig, editor: EditorConfig) -> Self {
        Self {
            posts: FilePostSource::new(&workspace.posts_dir),
            drafts: FileDraftStore::new(&workspace.drafts_dir),
            workspace,
            editor,
        }
    }

    /// Open `post_id` in a fresh headless session.
    async fn open(&self, post_id: &str) -> Result<(SessionHandle, SessionView)> {
        let session = EditorSession::spawn(
            self.editor.clone(),
            Arc::new(self.drafts.clone()),
            Arc::new(self.posts.clone()),
            HeadlessSurface,
        );
        let view = session.open(post_id).await?;
        Ok((session, view))
    }

    async fn list(&self) -> Result<()> {
        let posts = self.posts.list_posts(&self.drafts).await?;
        if posts.is_empty() {
            println!("no posts in {}", self.workspace.posts_dir.display());
            return Ok(());
        }
        for post in posts {
            let marker = if post.unpublished {
                "new"
            } else if post.has_draft {
                "draft"
            } else {
                ""
            };
            println!("{marker:<6} {:<40} {}", post.post_id, post.title);
        }
        Ok(())
    }

    async fn history(&self, post_id: &str) -> Result<()> {
        let (session, _) = self.open(post_id).await?;
        let history = session.history().await?;
        session.close().await?;

        for (index, entry) in history.entries().iter().enumerate() {
            let cursor = if index == history.cursor() { '>' } else { ' ' };
            let original = if entry.is_original { "  (original)" } else { "" };
            println!(
                "{cursor} {index:>3}  {}  {}{original}",
                entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                entry.title
            );
        }
        if history.is_dirty() {
            println!("draft differs from the published post");
        } else {
            println!("no unpublished changes");
        }
        Ok(())
    }

    async fn navigate(&self, post_id: &str, step: Move) -> Result<()> {
        let (session, _) = self.open(post_id).await?;
        let view = match step {
            Move::Undo => session.undo().await?,
            Move::Redo => session.redo().await?,
            Move::Restore(index) => session.restore(index).await?,
        };
        session.close().await?;
        println!("{post_id}: cursor at {} of {}", view.cursor, view.entries - 1);
        Ok(())
    }

    async fn diff(&self, post_id: &str, index: Option<usize>) -> Result<()> {
        let (session, _) = self.open(post_id).await?;
        let diff = session.diff(index).await?;
        session.close().await?;

        if diff.has_changes() {
            print!("{}", render_unified(&diff));
        } else {
            println!("no changes against the published post");
        }
        Ok(())
    }

    async fn discard(&self, post_id: &str) -> Result<()> {
        let (session, _) = self.open(post_id).await?;
        let view = session.discard().await?;
        session.close().await?;
        if view.unpublished {
            println!("{post_id}: draft history cleared");
        } else {
            println!("{post_id}: draft discarded");
        }
        Ok(())
    }

    async fn delete(&self, post_id: &str, yes: bool) -> Result<()> {
        if !yes {
            let answer = prompt(&format!("delete {post_id} and its draft history? [y/N] ")).await?;
            if !matches!(answer.trim(), "y" | "Y" | "yes") {
                println!("{post_id}: kept");
                return Ok(());
            }
        }
        let (session, _) = self.open(post_id).await?;
        session.delete().await?;
        println!("{post_id}: deleted");
        Ok(())
    }

    async fn deploy(
        &self,
        post_id: &str,
        preset: WorkflowPreset,
        message: Option<String>,
    ) -> Result<()> {
        let (session, _) = self.open(post_id).await?;
        let context = session.publish_context().await?;
        session.close().await?;

        let publisher = ShellPublisher::new(&self.workspace);
        let mut workflow =
            PublishWorkflow::from_preset(publisher, context, preset, self.workspace.allow_push)?;
        if let Some(message) = message {
            workflow.supply_commit_message(message)?;
        }
        println!("{}: {}", post_id, preset.label());

        loop {
            let state = workflow.run().await;
            match state.status {
                WorkflowStatus::Completed => break,
                WorkflowStatus::Paused => {
                    let message = prompt("commit message: ").await?;
                    match workflow.supply_commit_message(message) {
                        Ok(()) => {}
                        Err(WorkflowError::EmptyCommitMessage) => {
                            eprintln!("commit message cannot be empty");
                        }
                        Err(err) => return Err(err.into()),
                    }
                }
                WorkflowStatus::Error => {
                    print_outputs(workflow.state().outputs.iter());
                    return match workflow.state().failure() {
                        Some(err) => Err(err.into()),
                        None => Err(miette::miette!("workflow failed")),
                    };
                }
                WorkflowStatus::Active => {}
            }
        }

        print_outputs(workflow.state().outputs.iter());
        println!("done");
        Ok(())
    }
}

fn print_outputs<'a>(outputs: impl Iterator<Item = &'a inscript_editor_sync::StepOutput>) {
    for output in outputs {
        match &output.output {
            Some(text) => println!("[{}] {}", output.step, text),
            None => println!("[{}] ok", output.step),
        }
    }
}

async fn prompt(label: &str) -> Result<String> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(label.as_bytes()).await.into_diagnostic()?;
    stdout.flush().await.into_diagnostic()?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    match lines.next_line().await.into_diagnostic()? {
        Some(line) => Ok(line),
        None => Err(miette::miette!("stdin closed before a commit message was given")),
    }
}

fn init_miette() {
    let _ = miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .with_cause_chain()
                .color(true)
                .context_lines(5)
                .tab_width(2)
                .break_words(true)
                .build(),
        )
    }));
    miette::set_panic_hook();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_deploy() {
        let cli = Cli::parse_from([
            "inscript",
            "--posts",
            "content",
            "deploy",
            "hello.md",
            "--preset",
            "save-publish",
            "-m",
            "ship it",
        ]);
        assert_eq!(cli.posts, Some(PathBuf::from("content")));
        match cli.command {
            Commands::Deploy {
                post,
                preset,
                message,
            } => {
                assert_eq!(post, "hello.md");
                assert_eq!(preset, Preset::SavePublish);
                assert_eq!(message.as_deref(), Some("ship it"));
            }
            _ => panic!("expected deploy"),
        }
    }

    #[test]
    fn test_deploy_defaults_to_commit_preset() {
        let cli = Cli::parse_from(["inscript", "deploy", "hello.md"]);
        match cli.command {
            Commands::Deploy { preset, .. } => {
                assert_eq!(WorkflowPreset::from(preset), WorkflowPreset::SavePublishCommit)
            }
            _ => panic!("expected deploy"),
        }
    }

    #[test]
    fn test_cli_parses_delete() {
        let cli = Cli::parse_from(["inscript", "delete", "old.md", "--yes"]);
        match cli.command {
            Commands::Delete { post, yes } => {
                assert_eq!(post, "old.md");
                assert!(yes);
            }
            _ => panic!("expected delete"),
        }
    }

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
