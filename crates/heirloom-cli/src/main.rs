//! Heirloom CLI: runs the ingestion pipeline and the publish/version operations.
//!
//! Configuration comes from the environment (see `heirloom_core::Config`).

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use heirloom_cli::{init_tracing, AppContext};
use heirloom_core::models::LetterContent;
use heirloom_core::{AppError, Config, ErrorMetadata};
use heirloom_db::SortOrder;
use heirloom_services::PublishRequest;
use serde::Serialize;

#[derive(Parser)]
#[command(name = "heirloom", about = "Scanned letter ingestion and publishing")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge and transcribe the staged parts of an upload into a draft
    Process {
        #[arg(long)]
        upload_id: String,
        #[arg(long)]
        requester_id: String,
    },
    /// Publish a REVIEW draft as a letter
    Publish {
        #[arg(long)]
        draft_id: String,
        /// Letter date, e.g. 1943-05-02
        #[arg(long)]
        date: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        author: String,
        /// File holding the final letter text
        #[arg(long)]
        content_file: PathBuf,
        /// Add a new version if a letter already exists at this date
        #[arg(long)]
        edit: bool,
        #[arg(long)]
        editor: Option<String>,
    },
    /// Letter operations
    Letter {
        #[command(subcommand)]
        sub: LetterCommands,
    },
    /// Draft operations
    Draft {
        #[command(subcommand)]
        sub: DraftCommands,
    },
}

#[derive(Subcommand)]
enum LetterCommands {
    /// Show the current version of a letter
    Show {
        #[arg(long)]
        date: String,
    },
    /// List the versions of a letter
    History {
        #[arg(long)]
        date: String,
        #[arg(long, default_value = "20")]
        limit: usize,
        /// Cursor returned by a previous page
        #[arg(long)]
        cursor: Option<String>,
        /// Newest first
        #[arg(long)]
        desc: bool,
    },
    /// Append a corrected version of a published letter
    Edit {
        #[arg(long)]
        date: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        author: String,
        #[arg(long)]
        content_file: PathBuf,
        #[arg(long)]
        editor: Option<String>,
    },
    /// Make an older version current again
    Restore {
        #[arg(long)]
        date: String,
        #[arg(long)]
        timestamp: String,
        #[arg(long)]
        editor: Option<String>,
    },
}

#[derive(Subcommand)]
enum DraftCommands {
    /// Show the draft of an upload
    Show {
        #[arg(long)]
        upload_id: String,
    },
    /// Delete the draft of an upload
    Discard {
        #[arg(long)]
        upload_id: String,
    },
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize output")?;
    println!("{}", out);
    Ok(())
}

fn read_content(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read content file {}", path.display()))
}

/// Log an operation failure with its metadata and hand it to anyhow for the exit code.
fn report(err: AppError) -> anyhow::Error {
    tracing::error!(
        error_code = err.error_code(),
        recoverable = err.is_recoverable(),
        suggested_action = err.suggested_action().unwrap_or_default(),
        "{}",
        err.detailed_message()
    );
    anyhow::Error::new(err)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = Config::from_env().context("Invalid configuration")?;
    let ctx = AppContext::from_config(&config).await?;

    match cli.command {
        Commands::Process {
            upload_id,
            requester_id,
        } => {
            let draft = ctx
                .pipeline
                .run(&upload_id, &requester_id)
                .await
                .map_err(report)?;
            print_json(&draft)?;
        }
        Commands::Publish {
            draft_id,
            date,
            title,
            author,
            content_file,
            edit,
            editor,
        } => {
            let content = read_content(&content_file)?;
            let published = ctx
                .coordinator
                .publish(PublishRequest {
                    draft_id,
                    date,
                    title,
                    author,
                    content,
                    edit,
                    editor,
                })
                .await
                .map_err(report)?;
            print_json(&published)?;
        }
        Commands::Letter { sub } => match sub {
            LetterCommands::Show { date } => {
                let letter = ctx.coordinator.get_letter(&date).await.map_err(report)?;
                print_json(&letter)?;
            }
            LetterCommands::History {
                date,
                limit,
                cursor,
                desc,
            } => {
                let order = if desc {
                    SortOrder::Descending
                } else {
                    SortOrder::Ascending
                };
                let page = ctx
                    .coordinator
                    .list_versions(&date, order, limit, cursor.as_deref())
                    .await
                    .map_err(report)?;
                print_json(&serde_json::json!({
                    "versions": page.versions,
                    "nextCursor": page.next_cursor,
                }))?;
            }
            LetterCommands::Edit {
                date,
                title,
                author,
                content_file,
                editor,
            } => {
                let content = read_content(&content_file)?;
                let published = ctx
                    .coordinator
                    .edit_letter(
                        &date,
                        LetterContent {
                            title,
                            author,
                            content,
                        },
                        editor,
                    )
                    .await
                    .map_err(report)?;
                print_json(&published)?;
            }
            LetterCommands::Restore {
                date,
                timestamp,
                editor,
            } => {
                let published = ctx
                    .coordinator
                    .restore_version(&date, &timestamp, editor)
                    .await
                    .map_err(report)?;
                print_json(&published)?;
            }
        },
        Commands::Draft { sub } => match sub {
            DraftCommands::Show { upload_id } => {
                let draft = ctx
                    .drafts
                    .get(&upload_id)
                    .await
                    .map_err(report)?
                    .ok_or_else(|| report(AppError::NotFound(format!("Draft {} not found", upload_id))))?;
                print_json(&draft)?;
            }
            DraftCommands::Discard { upload_id } => {
                let deleted = ctx.drafts.delete(&upload_id).await.map_err(report)?;
                print_json(&serde_json::json!({
                    "uploadId": upload_id,
                    "deleted": deleted,
                }))?;
            }
        },
    }

    Ok(())
}
