mod config;

use anyhow::{Context, Result, bail};
use clap::{Parser as ClapParser, Subcommand, ValueEnum};
use compose_ide::export::write_bundle;
use compose_ide::platform::cli::{CommandRenderer, FileStorage};
use compose_ide::project::now_millis;
use compose_ide::{BuilderApi, Preview, RecordingHost, RenderMode, StatusKind, Surface, Workspace};
use config::Config;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(ClapParser)]
#[command(name = "compose-ide")]
#[command(about = "Compose mini IDE runtime")]
struct Cli {
    /// Configuration file (defaults to ./compose-ide.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Directory holding the persisted workspace
    #[arg(long, global = true)]
    storage_dir: Option<PathBuf>,
    /// Screen to operate on instead of the active one
    #[arg(long, global = true)]
    screen: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List screens
    Screens,
    /// Create a screen from the template and make it active
    New {
        /// Screen name (defaults to ScreenN)
        name: Option<String>,
    },
    /// Delete a screen and its companion source
    Delete { id: String },
    /// Print a screen's DSL source
    Show {
        /// Print the companion source instead
        #[arg(long)]
        companion: bool,
    },
    /// Replace a screen's source from files
    Save {
        /// DSL source file
        file: PathBuf,
        /// Companion source file
        #[arg(long)]
        companion: Option<PathBuf>,
    },
    /// Render the screen
    Render {
        #[command(flatten)]
        render: RenderArgs,
        #[arg(long, value_enum, default_value_t = OutputFormat::Html)]
        format: OutputFormat,
    },
    /// Render with the builtin renderer and fire an event on an interactive element
    Click {
        /// Index of the interactive element, in document order
        index: usize,
        #[arg(long, default_value = "click")]
        event: String,
    },
    /// Run an action against the state, e.g. `counter = counter + 1`
    Act { action: String },
    /// Print the state, or replace it with a JSON document
    State {
        #[arg(long)]
        set: Option<String>,
    },
    /// Record the current workspace as a history entry
    Snapshot,
    /// Step back one history entry
    Undo,
    /// Step forward one history entry
    Redo,
    /// List history entries
    History,
    /// Write the export bundle into a directory
    Export { directory: PathBuf },
    /// Check if a DSL file parses
    Check { file: PathBuf },
}

#[derive(clap::Args)]
struct RenderArgs {
    #[arg(long)]
    mode: Option<RenderMode>,
    /// External renderer command line
    #[arg(long)]
    renderer: Option<String>,
    #[arg(long)]
    timeout_ms: Option<u64>,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Html,
    Text,
    /// Node tree as JSON (builtin evaluation only)
    Json,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    if let Commands::Check { file } = &cli.command {
        return check(file);
    }

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(storage_dir) = cli.storage_dir {
        config.storage_dir = storage_dir;
    }

    let mut workspace = Workspace::open(FileStorage::new(config.storage_dir.clone()));
    if workspace.status().kind == StatusKind::Error {
        eprintln!("{}", workspace.status());
    }
    if let Some(id) = &cli.screen {
        if !workspace.select_screen(id) {
            bail!("Unknown screen `{id}`");
        }
    }

    match cli.command {
        Commands::Screens => {
            for screen in &workspace.project().screens {
                let marker = if workspace.active_screen_id() == Some(screen.id.as_str()) {
                    '*'
                } else {
                    ' '
                };
                println!("{marker} {}  {}", screen.id, screen.name);
            }
            return Ok(());
        }
        Commands::New { name } => {
            let id = workspace.new_screen(name.as_deref());
            println!("{id}");
        }
        Commands::Delete { id } => {
            workspace.delete_screen(&id);
        }
        Commands::Show { companion } => {
            let screen = workspace.current_screen().context("No screen selected")?;
            if companion {
                println!("{}", workspace.project().companion(&screen.id).unwrap_or_default());
            } else {
                println!("{}", screen.compose);
            }
            return Ok(());
        }
        Commands::Save { file, companion } => {
            let id = workspace
                .active_screen_id()
                .context("No screen selected")?
                .to_string();
            let compose = fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let companion = companion
                .map(|path| {
                    fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read {}", path.display()))
                })
                .transpose()?;
            workspace.save_screen_code(&id, &compose, companion.as_deref());
        }
        Commands::Render { render, format } => {
            if let Some(mode) = render.mode {
                config.render_mode = mode;
            }
            if render.renderer.is_some() {
                config.renderer_command = render.renderer;
            }
            if let Some(timeout_ms) = render.timeout_ms {
                config.renderer_timeout_ms = timeout_ms;
            }
            if let OutputFormat::Json = format {
                return dump_tree(&workspace);
            }
            let mut preview = preview(&config)?;
            let mut surface = Surface::new("preview");
            let outcome = workspace.render(&mut preview, &mut surface).await;
            for line in &outcome.logs {
                eprintln!("{line}");
            }
            match format {
                OutputFormat::Text => println!("{}", surface.text_content()),
                _ => println!("{}", surface.to_html()),
            }
        }
        Commands::Click { index, event } => {
            let mut preview = Preview::new(RenderMode::Builtin);
            let mut surface = Surface::new("preview");
            workspace.render(&mut preview, &mut surface).await;
            match workspace.interact(&surface, index, &event) {
                Ok(outcome) => {
                    for line in &outcome.logs {
                        eprintln!("{line}");
                    }
                    for action in &outcome.actions {
                        for error in &action.errors {
                            eprintln!("Action error: {error}");
                        }
                    }
                }
                Err(error) => eprintln!("{error}"),
            }
            workspace.render(&mut preview, &mut surface).await;
            println!("{}", surface.text_content());
        }
        Commands::Act { action } => {
            let outcome = workspace.execute_action(&action);
            for error in &outcome.errors {
                eprintln!("Action error: {error}");
            }
        }
        Commands::State { set } => match set {
            Some(json) => {
                let state = serde_json::from_str(&json).context("State must be a JSON document")?;
                workspace.set_state(state);
            }
            None => {
                println!("{}", serde_json::to_string_pretty(workspace.state())?);
                return Ok(());
            }
        },
        Commands::Snapshot => {
            // The status already carries the failure.
            let _ = workspace.snapshot();
        }
        Commands::Undo => {
            workspace.undo();
        }
        Commands::Redo => {
            workspace.redo();
        }
        Commands::History => {
            let history = workspace.history();
            for (index, entry) in history.entries().iter().enumerate() {
                let marker = if index == history.cursor() { '>' } else { ' ' };
                println!(
                    "{marker} {index:>3}  screens={}  active={}  state={}",
                    entry.project.screens.len(),
                    entry.active_screen_id.as_deref().unwrap_or("-"),
                    entry.state
                );
            }
            return Ok(());
        }
        Commands::Export { directory } => {
            let files = workspace.export(now_millis())?;
            write_bundle(&files, &directory)
                .with_context(|| format!("Failed to write bundle into {}", directory.display()))?;
            println!("Exported {} files into {}", files.len(), directory.display());
            return Ok(());
        }
        Commands::Check { file } => return check(&file),
    }

    let status = workspace.status();
    eprintln!("{status}");
    if status.kind == StatusKind::Error {
        std::process::exit(1);
    }
    Ok(())
}

fn preview(config: &Config) -> Result<Preview> {
    let mut preview = Preview::new(config.render_mode).with_timeout(config.renderer_timeout());
    if let Some(command) = &config.renderer_command {
        let renderer = CommandRenderer::from_command_line(command)
            .context("renderer_command must name a program")?;
        preview.load_renderer(Box::new(renderer));
    }
    Ok(preview)
}

fn dump_tree(workspace: &Workspace<FileStorage>) -> Result<()> {
    let source = workspace
        .current_screen()
        .map(|screen| screen.compose.as_str())
        .unwrap_or_default();
    let mut host = RecordingHost::default();
    let result = compose_ide::evaluate(source, &BuilderApi::standard(), workspace.state(), &mut host);
    for line in &host.logs {
        eprintln!("{line}");
    }
    let root = result?;
    println!("{}", serde_json::to_string_pretty(&root)?);
    Ok(())
}

fn check(file: &Path) -> Result<()> {
    let code = fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))?;
    match compose_ide::parser::parse_program(&file.display().to_string(), &code) {
        Ok(program) => {
            println!("OK: {} statements", program.len());
            Ok(())
        }
        Err(error) => {
            eprintln!("{}", error.report);
            bail!("{}", error.message)
        }
    }
}
