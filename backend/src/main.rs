//! Fieldmap CLI - Map CSV columns onto a fixed target field list
//!
//! # Main Commands
//!
//! ```bash
//! fieldmap serve                              # Start HTTP server (port 3000)
//! fieldmap map survey.csv -o mapped.csv       # Auto-map, calculate and export
//! fieldmap profile list                       # Manage saved mappings
//! ```
//!
//! # Inspection Commands
//!
//! ```bash
//! fieldmap inspect survey.csv      # Show encoding, delimiter, columns
//! fieldmap fields --rules          # Show target fields and rule tables
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use fieldmap::{
    api::logs::LOG_BROADCASTER, config::load_fields, default_writer, parse_csv_file_auto,
    rules_description, AppConfig, AutoMapMode, CancelToken, LogProgress, MappingTable,
    ProfileRegistry, RegistryError, Session,
};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "fieldmap")]
#[command(about = "Map CSV columns to a target field list and export the result", long_about = None)]
struct Cli {
    /// Do not echo log lines to stderr
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ExportFormat {
    /// Semicolon separated, UTF-8 with BOM
    Csv,
    /// Database file with a MappedData table
    Relational,
}

#[derive(Subcommand)]
enum Commands {
    /// Show how a CSV file is read
    Inspect {
        /// Input CSV file
        input: PathBuf,
    },

    /// Show the target field list
    Fields {
        /// Field list file (one name per line or JSON array)
        #[arg(long)]
        fields: Option<PathBuf>,

        /// Also show auto-map and extraction rules
        #[arg(long)]
        rules: bool,
    },

    /// Map, calculate and export a CSV file
    Map {
        /// Input CSV file
        input: PathBuf,

        /// Field list file (one name per line or JSON array)
        #[arg(long)]
        fields: Option<PathBuf>,

        /// Automatic mapping: position or rules
        #[arg(short, long)]
        auto: Option<AutoMapMode>,

        /// JSON file with a field -> column object
        #[arg(short, long)]
        mapping: Option<PathBuf>,

        /// Single binding, FIELD=COLUMN (repeatable)
        #[arg(long = "set", value_parser = parse_binding)]
        bindings: Vec<(String, String)>,

        /// Apply a saved profile
        #[arg(short, long)]
        profile: Option<String>,

        /// Save the final mapping as a profile
        #[arg(long)]
        save_profile: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "csv")]
        format: ExportFormat,

        /// Write CSV next to the output when no database driver is available
        #[arg(long)]
        fallback: bool,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Start HTTP server
    Serve {
        /// Port to listen on (default: FIELDMAP_PORT or 3000)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Manage saved mapping profiles
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },
}

#[derive(Subcommand)]
enum ProfileAction {
    /// List all stored profiles
    List,

    /// Show details of a profile
    Show {
        /// Profile ID
        id: String,
    },

    /// Delete a profile
    Delete {
        /// Profile ID
        id: String,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    if cli.quiet {
        LOG_BROADCASTER.set_echo(false);
    }

    let result = match AppConfig::from_env() {
        Ok(config) => run(cli.command, config).await,
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(command: Commands, config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Inspect { input } => cmd_inspect(&input, &config),

        Commands::Fields { fields, rules } => cmd_fields(fields.as_deref(), rules, &config),

        Commands::Map {
            input,
            fields,
            auto,
            mapping,
            bindings,
            profile,
            save_profile,
            format,
            fallback,
            output,
        } => cmd_map(
            &config,
            MapArgs {
                input,
                fields,
                auto,
                mapping,
                bindings,
                profile,
                save_profile,
                format,
                fallback,
                output,
            },
        ),

        Commands::Serve { port } => {
            let mut config = config;
            if let Some(port) = port {
                config.port = port;
            }
            fieldmap::server::start_server(config).await
        }

        Commands::Profile { action } => cmd_profile(action, &config),
    }
}

/// Parse `FIELD=COLUMN`. The column may be empty to unmap a field.
fn parse_binding(s: &str) -> Result<(String, String), String> {
    let (field, column) = s
        .split_once('=')
        .ok_or_else(|| format!("expected FIELD=COLUMN, got '{}'", s))?;
    let field = field.trim();
    if field.is_empty() {
        return Err(format!("missing field name in '{}'", s));
    }
    Ok((field.to_string(), column.trim().to_string()))
}

fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "\\t".to_string(),
        c => c.to_string(),
    }
}

fn cmd_inspect(input: &Path, config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let result = parse_csv_file_auto(input)?;
    let table = &result.table;

    println!("File:      {}", input.display());
    println!("Encoding:  {}", result.encoding);
    println!("Delimiter: '{}'", format_delimiter(result.delimiter));
    println!("Rows:      {}", table.row_count());
    println!("Columns ({}):", table.headers.len());
    for (i, header) in table.headers.iter().enumerate() {
        println!("  {:>3}. {}", i + 1, header);
    }

    let registry = ProfileRegistry::with_dir(&config.profile_dir);
    let compatible = registry.find_compatible(&table.headers);
    if !compatible.is_empty() {
        println!("\nCompatible profiles:");
        for (profile, score) in compatible {
            println!("  {} ({}) {:.0}% column match", profile.name, profile.id, score * 100.0);
        }
    }

    Ok(())
}

fn cmd_fields(
    fields_file: Option<&Path>,
    show_rules: bool,
    config: &AppConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let fields = match fields_file {
        Some(path) => load_fields(path)?,
        None => config.target_fields()?,
    };

    eprintln!("{} target fields:", fields.len());
    for field in fields.iter() {
        println!("{}", field);
    }

    if show_rules {
        println!("\nAuto-map rules (source column -> target fields):");
        for rule in config.auto_map_rules()?.iter() {
            println!("  {:<20} -> {}", rule.source, rule.targets.join(", "));
        }
        println!();
        print!("{}", rules_description(&config.extraction_rules()?));
    }

    Ok(())
}

struct MapArgs {
    input: PathBuf,
    fields: Option<PathBuf>,
    auto: Option<AutoMapMode>,
    mapping: Option<PathBuf>,
    bindings: Vec<(String, String)>,
    profile: Option<String>,
    save_profile: Option<String>,
    format: ExportFormat,
    fallback: bool,
    output: PathBuf,
}

fn cmd_map(config: &AppConfig, args: MapArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = Session::from_config(config)?;
    let mut registry = ProfileRegistry::with_dir(&config.profile_dir);

    let profile = match &args.profile {
        Some(id) => Some(
            registry
                .get(id)
                .cloned()
                .ok_or_else(|| RegistryError::NotFound(id.clone()))?,
        ),
        None => None,
    };

    match (&args.fields, &profile) {
        (Some(path), _) => session.set_fields(load_fields(path)?),
        (None, Some(profile)) => session.set_fields(profile.fields.clone()),
        (None, None) => {}
    }

    let info = session.load_file(&args.input)?;

    // Layers, each overriding the previous: auto-map, profile, mapping file, --set.
    let explicit = profile.is_some() || args.mapping.is_some() || !args.bindings.is_empty();
    match args.auto {
        Some(mode) => {
            session.auto_map(mode)?;
        }
        None if !explicit => {
            session.auto_map(AutoMapMode::Rules)?;
        }
        None => {}
    }

    if let Some(profile) = &profile {
        let mut mapping = profile.mapping.clone();
        mapping.retain_valid(session.fields(), &info.headers);
        let skipped = profile.mapping.len() - mapping.len();
        if skipped > 0 {
            eprintln!("   {} profile bindings do not fit this file and were skipped", skipped);
        }
        for entry in mapping.iter() {
            session.set_mapping(&entry.target, &entry.source)?;
        }
        registry.mark_used(&profile.id)?;
    }

    if let Some(path) = &args.mapping {
        let mapping: MappingTable = serde_json::from_str(&fs::read_to_string(path)?)?;
        for entry in mapping.iter() {
            session.set_mapping(&entry.target, &entry.source)?;
        }
    }

    for (field, column) in &args.bindings {
        session.set_mapping(field, column)?;
    }

    let summary = session.summary();
    eprintln!(
        "   Mapping: {} fields mapped, {} remaining, {} shared columns",
        summary.mapped, summary.remaining, summary.shared_columns
    );

    let cancel = CancelToken::new();
    session.calculate(&LogProgress, &cancel)?;

    if let Some(name) = &args.save_profile {
        let id = registry.save(
            name,
            session.fields().clone(),
            session.mapping().clone(),
            info.headers.clone(),
        )?;
        eprintln!("   Profile saved with ID: {}", id);
    }

    let exported = match args.format {
        ExportFormat::Csv => session.export_delimited(&args.output)?,
        ExportFormat::Relational => {
            let writer = default_writer();
            session.export_relational(&args.output, writer.as_ref(), args.fallback)?
        }
    };

    eprintln!(
        "\nDone: {} fields x {} rows written to {}",
        exported.fields.len(),
        exported.rows,
        exported.path.display()
    );
    Ok(())
}

fn cmd_profile(action: ProfileAction, config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut registry = ProfileRegistry::with_dir(&config.profile_dir);

    match action {
        ProfileAction::List => {
            let profiles = registry.list();
            if profiles.is_empty() {
                eprintln!("No profiles stored yet.");
                eprintln!("   Use 'fieldmap map <csv> --save-profile <name> -o <out>' to add one.");
                return Ok(());
            }

            eprintln!("Stored profiles ({}):\n", profiles.len());
            for p in profiles {
                println!("  {} ({})", p.name, p.id);
                println!("     Mapped fields: {}", p.mapping.len());
                println!("     Columns: {}", p.csv_columns.join(", "));
                println!("     Uses: {}", p.use_count);
                if let Some(ref last) = p.last_used {
                    println!("     Last used: {}", last);
                }
                println!();
            }
        }

        ProfileAction::Show { id } => {
            let p = registry
                .get(&id)
                .ok_or_else(|| RegistryError::NotFound(id.clone()))?;
            println!("Profile: {} ({})\n", p.name, p.id);
            println!("CSV Columns: {}", p.csv_columns.join(", "));
            println!("Target fields: {}", p.fields.len());
            println!("Created: {}", p.created_at);
            println!("Uses: {}", p.use_count);
            println!("\nMapping:");
            println!("{}", serde_json::to_string_pretty(&p.mapping)?);
        }

        ProfileAction::Delete { id } => {
            registry.delete(&id)?;
            eprintln!("Profile deleted: {}", id);
        }
    }

    Ok(())
}
