mod cli;

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use cli::{Cli, Command};
use notescan::config::{resolve_credential, AppConfig, ModelRole};
use notescan::edit::{splice_selection, EditSession};
use notescan::images::{read_image_files, Passthrough};
use notescan::notes::NoteStore;
use notescan::types::UNKNOWN_LATENCY;
use notescan::vision::{transcribe, TranscribeSettings};
use notescan::{LlmClient, StreamChunk};

/// Print streamed text to stdout as it arrives; errors go to stderr.
pub(crate) fn spawn_printer() -> (mpsc::UnboundedSender<StreamChunk>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(async move {
        let mut stdout = std::io::stdout();
        while let Some(chunk) = rx.recv().await {
            match chunk {
                StreamChunk::TextDelta(text) => {
                    print!("{}", text);
                    let _ = stdout.flush();
                }
                StreamChunk::Done => println!(),
                StreamChunk::Error(msg) => eprintln!("\n[Error: {}]", msg),
            }
        }
    });
    (tx, handle)
}

fn init_tracing() {
    // Default: info for this crate, override with RUST_LOG
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("notescan=info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: &Path) -> Result<AppConfig> {
    let mut config = if path.exists() {
        AppConfig::load_from(path)?
    } else {
        let config = AppConfig::default();
        config.save_to(path)?;
        eprintln!("[Config] Created default config: {}", path.display());
        eprintln!("[Config] Edit it to set your api keys, models and mirrors.");
        config
    };
    config.apply_env_overrides();
    Ok(config)
}

fn ctrl_c_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });
    cancel
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("Config already exists: {} (use --force to overwrite)", path.display());
    }
    AppConfig::default().save_to(path)?;
    println!("Wrote {}", path.display());
    Ok(())
}

/// Loaded config plus the client and Ctrl-C token every model command needs.
struct App {
    config: AppConfig,
    client: LlmClient,
    cancel: CancellationToken,
}

impl App {
    fn load(config_path: &Path) -> Result<Self> {
        let config = load_config(config_path)?;
        let client = LlmClient::with_timeouts(
            Duration::from_secs(config.request.generation_timeout_secs),
            Duration::from_secs(config.request.probe_timeout_secs),
        );
        Ok(Self {
            config,
            client,
            cancel: ctrl_c_token(),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => AppConfig::config_path()?,
    };

    match cli.command {
        Command::Init { force } => init_config(&config_path, force)?,

        Command::Models => {
            let config = load_config(&config_path)?;
            for model in &config.models {
                println!(
                    "{}  {} [{}] {}  latency: {}  mirrors: {}",
                    model.id(),
                    model.name,
                    model.provider.label(),
                    model.model,
                    model.latency_label(),
                    model.backup_urls.len()
                );
            }
        }

        Command::Probe { model } => {
            let App { config, client, .. } = App::load(&config_path)?;
            let targets: Vec<_> = match &model {
                Some(key) => vec![config
                    .find_model(key)
                    .with_context(|| format!("Unknown model: {}", key))?
                    .clone()],
                None => config.models.clone(),
            };
            let mut latencies = Vec::with_capacity(targets.len());
            for target in targets {
                let resolved = resolve_credential(target.clone());
                let latency = match client
                    .test_connection(&resolved, config.request.probe_max_tokens)
                    .await
                {
                    Ok(ms) => {
                        println!("{}: {} ms", target.name, ms);
                        ms as i64
                    }
                    Err(e) => {
                        println!("{}: failed: {}", target.name, e);
                        UNKNOWN_LATENCY
                    }
                };
                latencies.push((target.id().to_string(), latency));
            }
            AppConfig::record_latencies(&config_path, &latencies)?;
        }

        Command::Scan {
            images,
            workspace,
            folder,
            title,
            no_save,
        } => {
            let App { config, client, cancel } = App::load(&config_path)?;
            let model = config.model_for(ModelRole::Vision)?;
            let raw = read_image_files(&images).await?;
            let settings = TranscribeSettings {
                system_instruction: config.prompts.vision.clone(),
                max_tokens: config.request.max_tokens,
            };

            let (tx, printer) = spawn_printer();
            let result = transcribe(&client, &model, &settings, raw, &Passthrough, &tx, &cancel).await;
            drop(tx);
            let _ = printer.await;
            let markdown = result?;

            if !no_save {
                let store = NoteStore::new(config.notes_root()?);
                let workspace = workspace.unwrap_or_else(|| config.notes.default_workspace.clone());
                let path = store.save(&workspace, &folder, &title, &markdown)?;
                eprintln!("[Saved] {}", path.display());
            }
        }

        Command::Edit {
            file,
            instruction,
            start,
            end,
            write,
        } => {
            let App { config, client, cancel } = App::load(&config_path)?;
            let model = config.model_for(ModelRole::Edit)?;
            let document = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let range = start.unwrap_or(0)..end.unwrap_or(document.len());
            // Validates the range before any request is made.
            splice_selection(&document, range.clone(), "")?;

            let mut session = EditSession::new(
                &document[range.clone()],
                config.prompts.edit.clone(),
                config.request.max_tokens,
            );
            let (tx, printer) = spawn_printer();
            let result = session.send(&client, &model, &instruction, &tx, &cancel).await;
            drop(tx);
            let _ = printer.await;
            let revised = result?;

            if write {
                let updated = splice_selection(&document, range, &revised)?;
                tokio::fs::write(&file, updated)
                    .await
                    .with_context(|| format!("Failed to write {}", file.display()))?;
                eprintln!("[Saved] {}", file.display());
            }
        }

        Command::Chat { file } => {
            let App { config, client, cancel } = App::load(&config_path)?;
            let model = config.model_for(ModelRole::Edit)?;
            let document = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let session = EditSession::new(document, config.prompts.edit.clone(), config.request.max_tokens);
            cli::run_chat_loop(&client, &model, session, &file, &cancel).await?;
        }

        Command::Notes { workspace, folder } => {
            let config = load_config(&config_path)?;
            let store = NoteStore::new(config.notes_root()?);
            match workspace {
                None => {
                    for name in store.workspaces()? {
                        println!("{}/", name);
                    }
                }
                Some(workspace) => {
                    for name in store.folders(&workspace, &folder)? {
                        println!("{}/", name);
                    }
                    for note in store.list(&workspace, &folder)? {
                        println!("{}", note.file_name);
                    }
                }
            }
        }
    }

    Ok(())
}
