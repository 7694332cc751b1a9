//! CLI binary for scenelib: export, import, back up, and check scene-library projects.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scenelib_core::config::StoreConfig;
use scenelib_core::document::Document;
use scenelib_core::graph::EntityGraph;
use scenelib_core::kind::{EntityKind, Id};
use scenelib_core::merge::{IdMapping, MergePolicy};
use scenelib_core::validate::validate;
use scenelib_core::{ops, schema, storage};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "scenelib", about = "Scene library store: export, import, merge")]
struct Cli {
    /// Project root directory (defaults to current directory)
    #[arg(short, long, global = true)]
    project: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty project
    Init {
        /// Overwrite an existing project
        #[arg(long)]
        force: bool,
    },

    /// Show row counts and allocator state
    Info,

    /// Validate graph integrity (dangling references, id mismatches, stale allocators)
    Validate,

    /// Export one scene with everything it references
    ExportScene {
        /// Scene ID
        id: Id,

        /// Output file (prints to stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Export every library source with its tags and clips
    ExportLibrary {
        /// Output file (prints to stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Merge a document into the project
    Import {
        /// Document file
        file: PathBuf,

        /// Merge policy: exact, key (defaults to merge.default_policy)
        #[arg(long)]
        policy: Option<MergePolicy>,
    },

    /// Write every entity of the project to a document
    Backup {
        /// Output file
        file: PathBuf,
    },

    /// Replace the project with the contents of a backup document
    Restore {
        /// Backup file
        file: PathBuf,

        /// Overwrite an existing project
        #[arg(long)]
        force: bool,
    },

    /// Delete an entity and clear every reference to it
    Delete {
        /// Entity kind (scene, grid, source, tag, ...)
        kind: EntityKind,

        /// Entity ID
        id: Id,
    },
}

fn get_project_root(cli: &Cli) -> Result<PathBuf> {
    match &cli.project {
        Some(p) => Ok(p.clone()),
        None => std::env::current_dir().context("failed to get current directory"),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let project_root = get_project_root(&cli)?;
    let config = StoreConfig::load(&project_root)?;
    tracing::debug!(
        "project root {} (max depth {}, default policy {})",
        project_root.display(),
        config.codec.max_depth,
        config.merge.default_policy
    );

    match cli.command {
        Commands::Init { force } => cmd_init(&project_root, &config, force),
        Commands::Info => cmd_info(&project_root),
        Commands::Validate => cmd_validate(&project_root),
        Commands::ExportScene { id, output } => {
            let graph = load_project(&project_root)?;
            let doc = ops::export_scene(&graph, id, &config)?;
            emit_document(&doc, output.as_deref(), &config)
        }
        Commands::ExportLibrary { output } => {
            let graph = load_project(&project_root)?;
            let doc = ops::export_library(&graph, &config)?;
            emit_document(&doc, output.as_deref(), &config)
        }
        Commands::Import { file, policy } => {
            let policy = policy.unwrap_or(config.merge.default_policy);
            cmd_import(&project_root, &file, policy, &config)
        }
        Commands::Backup { file } => {
            let graph = load_project(&project_root)?;
            let doc = ops::backup(&graph, &config)?;
            storage::write_document(&file, &doc, config.storage.pretty)?;
            println!("Backed up {} entities to {}", doc.root_count(), file.display());
            Ok(())
        }
        Commands::Restore { file, force } => cmd_restore(&project_root, &file, force, &config),
        Commands::Delete { kind, id } => cmd_delete(&project_root, kind, id, &config),
    }
}

fn load_project(project_root: &Path) -> Result<EntityGraph> {
    if !storage::project_exists(project_root) {
        anyhow::bail!("No project found. Run `scenelib init` first.");
    }
    storage::load(project_root)
}

fn emit_document(doc: &Document, output: Option<&Path>, config: &StoreConfig) -> Result<()> {
    match output {
        Some(path) => {
            storage::write_document(path, doc, config.storage.pretty)?;
            eprintln!("Exported {} root(s) to {}", doc.root_count(), path.display());
        }
        None => println!("{}", schema::document_to_json(doc, config.storage.pretty)?),
    }
    Ok(())
}

fn print_mapping(mapping: &IdMapping) {
    for kind in EntityKind::ALL {
        let Some(ids) = mapping.kind(kind) else {
            continue;
        };
        let moved = ids.iter().filter(|(from, to)| from != to).count();
        println!("  {:<16} {:>6} rows ({} re-keyed)", kind, ids.len(), moved);
    }
}

fn cmd_init(project_root: &Path, config: &StoreConfig, force: bool) -> Result<()> {
    if storage::project_exists(project_root) && !force {
        anyhow::bail!(
            "Project already exists at {}. Use --force to overwrite.",
            storage::project_file(project_root).display()
        );
    }
    storage::save(project_root, &EntityGraph::new(), config.storage.pretty)?;
    println!(
        "Initialized empty project at {}",
        storage::project_file(project_root).display()
    );
    Ok(())
}

fn cmd_info(project_root: &Path) -> Result<()> {
    if !storage::project_exists(project_root) {
        eprintln!("No project found. Run `scenelib init` first.");
        return Ok(());
    }

    let graph = storage::load(project_root)?;
    let stats = graph.stats();

    println!("Project: {}", storage::project_file(project_root).display());
    println!();
    println!("  {:<16} {:>6} {:>8}", "kind", "rows", "next id");
    for (kind, count) in &stats.counts {
        println!("  {:<16} {:>6} {:>8}", kind, count, graph.next_id(*kind));
    }
    println!();
    println!("Total entities: {}", stats.total);
    Ok(())
}

fn cmd_validate(project_root: &Path) -> Result<()> {
    if !storage::project_exists(project_root) {
        anyhow::bail!("No project found. Run `scenelib init` first.");
    }

    let graph = storage::load_unchecked(project_root)?;
    let violations = validate(&graph);
    for violation in &violations {
        println!("WARN: {}", violation);
    }

    if violations.is_empty() {
        println!("Project is valid ({} entities).", graph.stats().total);
        Ok(())
    } else {
        anyhow::bail!("{} issue(s) found", violations.len())
    }
}

fn cmd_import(
    project_root: &Path,
    file: &Path,
    policy: MergePolicy,
    config: &StoreConfig,
) -> Result<()> {
    let mut graph = load_project(project_root)?;
    let doc = storage::read_document(file)?;
    let mapping = ops::import_document(&mut graph, &doc, policy, config)
        .with_context(|| format!("import of {} failed; project unchanged", file.display()))?;
    storage::save(project_root, &graph, config.storage.pretty)?;

    println!(
        "Imported {} ({} rows, {} policy)",
        file.display(),
        mapping.len(),
        policy
    );
    print_mapping(&mapping);
    Ok(())
}

fn cmd_restore(project_root: &Path, file: &Path, force: bool, config: &StoreConfig) -> Result<()> {
    if storage::project_exists(project_root) && !force {
        anyhow::bail!("Project already exists. Use --force to replace it with the backup.");
    }
    let doc = storage::read_document(file)?;
    let (graph, mapping) = ops::restore_backup(&doc, config)
        .with_context(|| format!("restore of {} failed", file.display()))?;
    storage::save(project_root, &graph, config.storage.pretty)?;

    println!("Restored {} entities from {}", graph.stats().total, file.display());
    print_mapping(&mapping);
    Ok(())
}

fn cmd_delete(project_root: &Path, kind: EntityKind, id: Id, config: &StoreConfig) -> Result<()> {
    let mut graph = load_project(project_root)?;
    let referrers = graph.referrers(kind, id);
    graph.delete_cascade(kind, id)?;
    storage::save(project_root, &graph, config.storage.pretty)?;

    println!("Deleted {} {}", kind, id);
    for (ref_kind, ref_id) in referrers {
        println!("  detached from {} {}", ref_kind, ref_id);
    }
    Ok(())
}
