use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use notescan::edit::EditSession;
use notescan::{LlmClient, ModelConfig};

#[derive(Parser)]
#[command(name = "notescan", version, about = "Photos of handwritten problems to Markdown notes")]
pub struct Cli {
    /// Config file (default: ~/.notescan/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Write the default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// List configured models
    Models,
    /// Measure latency of one model (by id or name), or of all models
    Probe { model: Option<String> },
    /// Transcribe photos into a Markdown note
    Scan {
        #[arg(required = true)]
        images: Vec<PathBuf>,
        #[arg(long)]
        workspace: Option<String>,
        /// Folder inside the workspace, e.g. "calculus/limits"
        #[arg(long, default_value = "")]
        folder: String,
        #[arg(long, default_value = "Scan")]
        title: String,
        /// Print only, do not store the note
        #[arg(long)]
        no_save: bool,
    },
    /// Apply one instruction to a Markdown file or a byte range of it
    Edit {
        file: PathBuf,
        #[arg(long, short)]
        instruction: String,
        #[arg(long)]
        start: Option<usize>,
        #[arg(long)]
        end: Option<usize>,
        /// Write the result back into the file
        #[arg(long)]
        write: bool,
    },
    /// Interactive multi-turn editing of a Markdown file
    Chat { file: PathBuf },
    /// Browse stored notes
    Notes {
        workspace: Option<String>,
        #[arg(long, default_value = "")]
        folder: String,
    },
}

/// Read instructions from stdin and stream revisions until `quit`.
///
/// `/write` replaces the file with the latest reply.
pub async fn run_chat_loop(
    client: &LlmClient,
    model: &ModelConfig,
    mut session: EditSession,
    file: &Path,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    eprintln!("Type an instruction. /write saves the latest revision, quit or exit leaves.");
    loop {
        eprint!("You > ");
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim().to_string();
        if input.is_empty() {
            continue;
        }
        match input.to_lowercase().as_str() {
            "quit" | "exit" | "/quit" | "/exit" => {
                eprintln!("Goodbye!");
                break;
            }
            "/write" => {
                match session.latest_reply() {
                    Some(reply) => {
                        tokio::fs::write(file, reply)
                            .await
                            .with_context(|| format!("Failed to write {}", file.display()))?;
                        eprintln!("[Saved {}]", file.display());
                    }
                    None => eprintln!("[Nothing to save yet]"),
                }
                continue;
            }
            _ => {}
        }

        let (tx, printer) = crate::spawn_printer();
        let result = session.send(client, model, &input, &tx, cancel).await;
        drop(tx);
        let _ = printer.await;
        if result.is_err() && cancel.is_cancelled() {
            break;
        }
    }
    Ok(())
}
