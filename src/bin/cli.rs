// CLI binary: panicking on unrecoverable errors is fine here.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::unreachable, clippy::indexing_slicing)]

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::prelude::*;

use patchbook::error::AppError;
use patchbook::import::service::ImportReport;
use patchbook::import::{ImportOptions, SourceFormat};
use patchbook::merge::ImportPolicy;
use patchbook::model::AddressMode;
use patchbook::settings::{self, AppSettings};
use patchbook::state::AppState;
use patchbook::store::PatchStore;
use patchbook::validation;

// ── CLI argument parsing ─────────────────────────────────────────

#[derive(Parser)]
#[command(name = "patchbook-cli", about = "Patchbook headless CLI", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Data directory override
    #[arg(long, global = true)]
    data_dir: Option<String>,

    /// Output raw JSON instead of formatted text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a patch file (EOS CSV, tab-delimited or fixture-layer XML)
    Import {
        path: PathBuf,
        /// eos, tab or xml. Detected from the extension when omitted.
        #[arg(long)]
        format: Option<SourceFormat>,
        /// merge or replace. Defaults to the saved setting.
        #[arg(long)]
        policy: Option<ImportPolicy>,
        /// Comma-separated source headers to keep (tab-delimited only)
        #[arg(long, value_delimiter = ',')]
        fields: Option<Vec<String>>,
        /// Show name to record if the show has none
        #[arg(long)]
        show_name: Option<String>,
    },
    /// Import a GDTF package into the fixture library
    ImportGdtf { path: PathBuf },
    /// List instruments in the open show
    List,
    /// List instrument pairs whose DMX ranges collide
    Overlaps,
    /// List groups of instruments identical in every field but id
    Duplicates,
    /// Fixture library management
    Library {
        #[command(subcommand)]
        action: LibraryAction,
    },
    /// Show or change settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand)]
enum LibraryAction {
    /// List library entries
    List,
    /// Show one entry with its modes and wheels
    Show { fixture_type_id: String },
    /// Remove an entry and its package
    Remove { fixture_type_id: String },
    /// Copy library data onto a patched instrument
    Apply {
        fixture_type_id: String,
        #[arg(long)]
        channel: String,
        #[arg(long, default_value_t = 1)]
        part: u32,
        #[arg(long)]
        mode: Option<String>,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Print current settings
    Show,
    /// Change display and import defaults
    Set {
        /// universe or absolute
        #[arg(long)]
        address_mode: Option<String>,
        #[arg(long)]
        show_universe1: Option<bool>,
        /// merge or replace
        #[arg(long)]
        default_policy: Option<ImportPolicy>,
    },
}

// ── Startup ──────────────────────────────────────────────────────

fn dirs_config_dir() -> PathBuf {
    let base = if cfg!(target_os = "windows") {
        std::env::var("APPDATA")
            .map_or_else(|_| PathBuf::from("C:\\Users\\Default\\AppData\\Roaming"), PathBuf::from)
    } else if cfg!(target_os = "macos") {
        dirs_home().join("Library/Application Support")
    } else {
        std::env::var("XDG_CONFIG_HOME")
            .map_or_else(|_| dirs_home().join(".config"), PathBuf::from)
    };
    base.join(patchbook::paths::APP_ID)
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_or_else(|_| PathBuf::from("."), PathBuf::from)
}

fn initialize_state(data_dir_override: Option<&str>) -> Result<AppState, AppError> {
    let app_config_dir = dirs_config_dir();
    let loaded = settings::load_settings(&app_config_dir)
        .unwrap_or_else(|| AppSettings::new(app_config_dir.join("data")));
    let data_dir = data_dir_override.map_or_else(|| loaded.data_dir.clone(), PathBuf::from);
    std::fs::create_dir_all(&data_dir)?;
    AppState::open_in(app_config_dir, loaded, data_dir)
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "patchbook=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

// ── Output ───────────────────────────────────────────────────────

struct Output {
    message: String,
    data: Value,
}

impl Output {
    fn new(message: impl Into<String>, data: impl serde::Serialize) -> Self {
        Self {
            message: message.into(),
            data: serde_json::to_value(data).unwrap_or(Value::Null),
        }
    }
}

fn print_output(output: &Output, raw_json: bool) {
    if raw_json {
        let json = serde_json::json!({
            "message": output.message,
            "result": output.data,
        });
        println!("{}", serde_json::to_string_pretty(&json).unwrap_or_default());
        return;
    }
    println!("{}", output.message);
}

fn report_output(report: ImportReport) -> Result<Output, AppError> {
    match report.error.clone() {
        Some(err) if !report.ok => Err(err),
        _ => Ok(Output::new(report.message.clone(), report)),
    }
}

// ── Commands ─────────────────────────────────────────────────────

async fn run(state: &AppState, command: Commands) -> Result<Output, AppError> {
    match command {
        Commands::Import {
            path,
            format,
            policy,
            fields,
            show_name,
        } => {
            let options = ImportOptions {
                field_allow_list: fields,
                show_name,
            };
            report_output(state.import_patch(&path, format, &options, policy).await)
        }
        Commands::ImportGdtf { path } => report_output(state.import_gdtf(&path).await),
        Commands::List => {
            let instruments = state.with_store(|s| s.instruments())?;
            let mut lines = vec![format!("{} instrument(s)", instruments.len())];
            for inst in &instruments {
                lines.push(format!(
                    "{:>5}  {}.{}  {:<8}  {:<24}  {}",
                    inst.id.0,
                    inst.channel,
                    inst.part,
                    state.display_address(&inst.address),
                    inst.instrument_type,
                    inst.purpose,
                ));
            }
            Ok(Output::new(lines.join("\n"), instruments))
        }
        Commands::Overlaps => {
            let instruments = state.with_store(|s| s.instruments())?;
            let pairs = validation::all_overlaps(&instruments);
            let mut lines = vec![format!("{} overlapping pair(s)", pairs.len())];
            lines.extend(pairs.iter().map(|(a, b)| format!("  {a} <-> {b}")));
            Ok(Output::new(lines.join("\n"), pairs))
        }
        Commands::Duplicates => {
            let instruments = state.with_store(|s| s.instruments())?;
            let groups = validation::find_duplicates(&instruments);
            let mut lines = vec![format!("{} duplicate group(s)", groups.len())];
            for group in &groups {
                let ids: Vec<String> = group.iter().map(ToString::to_string).collect();
                lines.push(format!("  {}", ids.join(", ")));
            }
            Ok(Output::new(lines.join("\n"), groups))
        }
        Commands::Library { action } => run_library(state, action),
        Commands::Settings { action } => run_settings(state, action),
    }
}

fn run_library(state: &AppState, action: LibraryAction) -> Result<Output, AppError> {
    match action {
        LibraryAction::List => state.with_library(|lib| {
            let mut lines = vec![format!("{} fixture type(s)", lib.len())];
            for def in lib.iter() {
                lines.push(format!(
                    "  {}  {} / {}  ({} mode(s))",
                    def.fixture_type_id,
                    def.manufacturer,
                    def.display_name(),
                    def.dmx_modes.len()
                ));
            }
            let entries: Vec<_> = lib.iter().cloned().collect();
            Ok(Output::new(lines.join("\n"), entries))
        }),
        LibraryAction::Show { fixture_type_id } => {
            let def = state
                .with_library(|lib| lib.get(&fixture_type_id).cloned())
                .ok_or_else(|| AppError::NotFound {
                    what: format!("Fixture type {fixture_type_id}"),
                })?;
            let mut lines = vec![format!("{} / {}", def.manufacturer, def.display_name())];
            for mode in &def.dmx_modes {
                lines.push(format!("  mode {}: {} channel(s)", mode.name, mode.footprint));
            }
            for wheel in &def.wheels {
                lines.push(format!("  wheel {}: {} slot(s)", wheel.name, wheel.slots.len()));
            }
            Ok(Output::new(lines.join("\n"), def))
        }
        LibraryAction::Remove { fixture_type_id } => {
            let removed = state.with_library_mut(|lib| lib.remove(&fixture_type_id))?;
            match removed {
                Some(def) => Ok(Output::new(format!("Removed {fixture_type_id}"), def)),
                None => Err(AppError::NotFound {
                    what: format!("Fixture type {fixture_type_id}"),
                }),
            }
        }
        LibraryAction::Apply {
            fixture_type_id,
            channel,
            part,
            mode,
        } => {
            let inst =
                state.populate_from_library(&channel, part, &fixture_type_id, mode.as_deref())?;
            Ok(Output::new(
                format!("Applied {fixture_type_id} to {}.{}", inst.channel, inst.part),
                inst,
            ))
        }
    }
}

fn run_settings(state: &AppState, action: SettingsAction) -> Result<Output, AppError> {
    match action {
        SettingsAction::Show => {
            let current = state.settings();
            let text = serde_json::to_string_pretty(&current).unwrap_or_default();
            Ok(Output::new(text, current))
        }
        SettingsAction::Set {
            address_mode,
            show_universe1,
            default_policy,
        } => {
            let mut current = state.settings();
            if let Some(mode) = address_mode {
                current.address_mode = match mode.to_lowercase().as_str() {
                    "universe" => AddressMode::Universe,
                    "absolute" => AddressMode::Absolute,
                    other => return Err(format!("unknown address mode '{other}'").into()),
                };
            }
            if let Some(flag) = show_universe1 {
                current.show_universe1 = flag;
            }
            if let Some(policy) = default_policy {
                current.default_policy = policy;
            }
            state.update_settings(current.clone())?;
            Ok(Output::new("Settings saved", current))
        }
    }
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    let state = match initialize_state(cli.data_dir.as_deref()) {
        Ok(state) => state,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    match run(&state, cli.command).await {
        Ok(output) => print_output(&output, cli.json),
        Err(e) => {
            if cli.json {
                let json = serde_json::json!({ "error": e });
                println!("{}", serde_json::to_string_pretty(&json).unwrap_or_default());
            } else {
                eprintln!("Error: {e}");
            }
            process::exit(1);
        }
    }
}
