//! searchkit CLI - compile and run catalog-driven searches
//!
//! Usage:
//!   searchkit compile --catalog <catalog.toml> --request <request.json> [--dialect <dialect>]
//!   searchkit run --catalog <catalog.toml> --request <request.json> [--database <file.db>]
//!   searchkit list --catalog <catalog.toml>
//!
//! Examples:
//!   searchkit compile --catalog catalog.toml --request computers.json --dialect sqlite
//!   RUST_LOG=searchkit=debug searchkit run --catalog catalog.toml --request computers.json

use clap::{Parser, Subcommand, ValueEnum};
use searchkit::cache::CatalogCache;
use searchkit::catalog::{Catalog, CatalogProvider, FragmentRegistry};
use searchkit::config::Settings;
use searchkit::search::{HierarchyClosures, SearchEngine, SearchRequest, TranslationIndex};
use searchkit::sql::Dialect;
use searchkit::transport::SqliteTransport;
use searchkit::visibility::{ActorContext, READ};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "searchkit")]
#[command(about = "searchkit - compile criteria trees to SQL over a field catalog")]
#[command(version)]
struct Cli {
    /// Settings file (defaults to $SEARCHKIT_CONFIG or ./searchkit.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the count and data SQL of a search
    Compile {
        /// Path to the catalog TOML file
        #[arg(long)]
        catalog: PathBuf,

        /// Path to the search request JSON file
        #[arg(long)]
        request: PathBuf,

        /// Actor context JSON file (defaults to read access everywhere)
        #[arg(long)]
        actor: Option<PathBuf>,

        /// SQL dialect to generate (defaults to the configured one)
        #[arg(short, long)]
        dialect: Option<DialectArg>,
    },

    /// Run a search against a SQLite database and print the JSON result
    Run {
        #[arg(long)]
        catalog: PathBuf,

        #[arg(long)]
        request: PathBuf,

        #[arg(long)]
        actor: Option<PathBuf>,

        /// SQLite database (defaults to `database.path` from the settings)
        #[arg(long)]
        database: Option<PathBuf>,
    },

    /// List the entity types of a catalog
    List {
        #[arg(long)]
        catalog: PathBuf,
    },
}

#[derive(Clone, ValueEnum)]
enum DialectArg {
    Mysql,
    Sqlite,
}

impl From<DialectArg> for Dialect {
    fn from(arg: DialectArg) -> Self {
        match arg {
            DialectArg::Mysql => Dialect::MySql,
            DialectArg::Sqlite => Dialect::Sqlite,
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = match load_settings(cli.config.as_deref()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Commands::Compile {
            catalog,
            request,
            actor,
            dialect,
        } => cmd_compile(&settings, &catalog, &request, actor.as_deref(), dialect),
        Commands::Run {
            catalog,
            request,
            actor,
            database,
        } => cmd_run(&settings, &catalog, &request, actor.as_deref(), database),
        Commands::List { catalog } => cmd_list(&catalog),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

type CliResult = Result<ExitCode, Box<dyn std::error::Error>>;

fn load_settings(path: Option<&Path>) -> searchkit::config::SettingsResult<Settings> {
    match path {
        Some(path) => Settings::from_file(path),
        None => Settings::load(),
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, Box<dyn std::error::Error>> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("reading '{}': {}", path.display(), e))?;
    Ok(serde_json::from_str(&content)?)
}

/// Actor from a file, or one with read access to every catalog type.
fn load_actor(path: Option<&Path>, catalog: &Catalog) -> Result<ActorContext, Box<dyn std::error::Error>> {
    if let Some(path) = path {
        return read_json(path);
    }
    Ok(catalog
        .entity_names()
        .into_iter()
        .fold(ActorContext::new(0, vec![0]), |actor, name| {
            actor.with_right(name, READ)
        }))
}

fn build_engine(settings: &Settings, catalog: Catalog) -> SearchEngine {
    let registry = FragmentRegistry::with_defaults(&settings.search.table_prefix);
    let cache = CatalogCache::new(Arc::new(catalog), registry);
    SearchEngine::new(Arc::new(cache), settings.search.clone())
}

fn cmd_compile(
    settings: &Settings,
    catalog_path: &Path,
    request_path: &Path,
    actor_path: Option<&Path>,
    dialect: Option<DialectArg>,
) -> CliResult {
    let catalog = Catalog::from_file(catalog_path)?;
    let actor = load_actor(actor_path, &catalog)?;
    let request: SearchRequest = read_json(request_path)?;
    let engine = build_engine(settings, catalog);

    let dialect = dialect.map(Dialect::from).unwrap_or(settings.search.dialect);
    let compiled = engine.compile_for(dialect, &request, &actor, &HierarchyClosures::new())?;

    for warning in &compiled.warnings {
        eprintln!("warning: {}", warning);
    }
    println!("-- count");
    println!("{};", compiled.count_sql);
    println!();
    println!("-- data");
    println!("{};", compiled.data_sql);
    Ok(ExitCode::SUCCESS)
}

fn cmd_run(
    settings: &Settings,
    catalog_path: &Path,
    request_path: &Path,
    actor_path: Option<&Path>,
    database: Option<PathBuf>,
) -> CliResult {
    let database = match database {
        Some(path) => path,
        None => settings
            .database
            .resolved_path()?
            .ok_or("no database given and `database.path` is not set")?,
    };

    let catalog = Catalog::from_file(catalog_path)?;
    let actor = load_actor(actor_path, &catalog)?;
    let request: SearchRequest = read_json(request_path)?;
    let engine = build_engine(settings, catalog);
    let transport = SqliteTransport::open(&database)?;

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(async {
        let engine = match TranslationIndex::load(&transport, &settings.locale).await {
            Ok(index) if !index.is_empty() => engine.with_translations(index),
            Ok(_) => engine,
            Err(e) => {
                tracing::debug!(error = %e, "no translations loaded");
                engine
            }
        };
        engine.search(&transport, &request, &actor).await
    });

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(if result.is_failed() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn cmd_list(catalog_path: &Path) -> CliResult {
    let catalog = Catalog::from_file(catalog_path)?;

    println!("Catalog: {}", catalog_path.display());
    println!();

    let mut names = catalog.entity_names();
    names.sort_unstable();
    for name in names {
        let Some(entity) = catalog.entity_type(name) else {
            continue;
        };
        if entity.union_of.is_empty() {
            println!(
                "  - {} ({}, {} fields)",
                entity.name,
                entity.table,
                entity.fields.len() + entity.plugin_fields.len()
            );
        } else {
            println!("  - {} (union of: {})", entity.name, entity.union_of.join(", "));
        }
    }

    Ok(ExitCode::SUCCESS)
}
