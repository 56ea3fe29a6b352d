//! MPD CLI - Command-line interface for the MPD compiler and runtime
//!
//! Provides subcommands for checking, compiling, formatting and playing
//! back MPD presentations without a renderer.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use mpd::compiler::{self, Compilation};
use mpd::runtime::action::ActionContext;
use mpd::runtime::headless::{HeadlessCamera, HeadlessDiagram, HeadlessOverlay, IntervalFrames, MemoryHost};
use mpd::runtime::{
    ActionDefinition, Controller, ControllerConfig, ControllerEvent, EventKind, HandlerMap,
    PlaybackConfig, PresentationDocument,
};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "mpd")]
#[command(about = "Compile and play back MPD narrated diagram tours", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print diagnostics; exits non-zero on errors
    Check {
        /// MPD source file
        file: PathBuf,
    },

    /// Print the normalized presentation document as JSON
    Compile {
        /// MPD source file
        file: PathBuf,
    },

    /// Print the source in canonical form
    Fmt {
        /// MPD source file
        file: PathBuf,
    },

    /// Play a presentation headlessly, printing each controller state
    Play {
        /// MPD source or presentation document JSON
        file: PathBuf,

        /// Playback config JSON
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Check { file } => {
            let compilation = compile_file(&file)?;
            report(&file, &compilation);
            if compilation.has_errors() {
                bail!("{} has errors", file.display());
            }
            println!("{}: ok", file.display());
        }

        Commands::Compile { file } => {
            let compilation = compile_file(&file)?;
            report(&file, &compilation);
            let failed = compilation.has_errors();
            let Some(document) = compilation.document.filter(|_| !failed) else {
                bail!("{} has errors", file.display());
            };
            println!("{}", document.to_json_pretty()?);
        }

        Commands::Fmt { file } => {
            let compilation = compile_file(&file)?;
            let Some(program) = compilation.ast.as_ref().filter(|_| !compilation.has_errors()) else {
                report(&file, &compilation);
                bail!("{} has errors", file.display());
            };
            print!("{}", compiler::print(program));
        }

        Commands::Play { file, config } => {
            let playback = match config {
                Some(path) => PlaybackConfig::load(&path)?,
                None => PlaybackConfig::default(),
            };
            let document = load_document(&file)?;
            play(document, playback).await?;
        }
    }

    Ok(())
}

fn compile_file(path: &Path) -> Result<Compilation> {
    let source = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(compiler::compile(&source))
}

fn report(path: &Path, compilation: &Compilation) {
    for diagnostic in &compilation.diagnostics {
        eprintln!("{}:{}", path.display(), diagnostic);
    }
}

fn load_document(path: &Path) -> Result<PresentationDocument> {
    if path.extension().is_some_and(|ext| ext == "json") {
        let json = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
        return Ok(PresentationDocument::from_json(&json)?);
    }
    let compilation = compile_file(path)?;
    report(path, &compilation);
    let failed = compilation.has_errors();
    match compilation.document {
        Some(document) if !failed => Ok(document),
        _ => bail!("{} has errors", path.display()),
    }
}

/// Handler map that logs every action type used by `document`.
fn logging_handlers(document: &PresentationDocument) -> HandlerMap {
    let mut kinds = BTreeSet::from([mpd::runtime::controller::STYLE_CLEAR_ACTION.to_string()]);
    let bindings = document
        .bindings
        .iter()
        .chain(document.steps.iter().flat_map(|step| step.bindings.iter()));
    for action in document
        .steps
        .iter()
        .flat_map(|step| step.actions.iter())
        .chain(bindings.flat_map(|binding| binding.actions.iter()))
    {
        kinds.insert(action.kind.clone());
    }

    let mut handlers = HandlerMap::new();
    for kind in kinds {
        handlers.register(kind, |action: ActionDefinition, ctx: ActionContext| async move {
            tracing::info!(
                step = ctx.step_id.as_deref().unwrap_or("-"),
                action = %action.kind,
                payload = %action.payload.unwrap_or_default(),
                "action"
            );
            Ok::<_, anyhow::Error>(())
        });
    }
    handlers
}

async fn play(document: PresentationDocument, playback: PlaybackConfig) -> Result<()> {
    let render = document.render_payload();
    let config = ControllerConfig::new(document.clone(), Arc::new(HeadlessDiagram::default()), Arc::new(MemoryHost::new()))
        .with_handlers(logging_handlers(&document))
        .with_camera(Arc::new(HeadlessCamera::default()))
        .with_overlay(Arc::new(HeadlessOverlay::default()))
        .with_frames(Arc::new(IntervalFrames::new(playback.frame_interval())))
        .with_playback(playback);
    let controller = Controller::new(config);
    controller.on(EventKind::Error, |event| {
        if let ControllerEvent::Error(err) = event {
            tracing::warn!("{err}");
        }
    });

    controller.init(render).await?;
    let mut state = controller.state();
    println!("{}", serde_json::to_string(&state)?);
    loop {
        controller.next().await?;
        let next = controller.state();
        if next.step_index == state.step_index {
            break;
        }
        println!("{}", serde_json::to_string(&next)?);
        state = next;
    }

    controller.destroy();
    Ok(())
}
