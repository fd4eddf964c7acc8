mod runner;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};

use formrun_schema::FormSchema;
use formrun_store::{JsonFileStore, SnapshotStore};

/// Formrun form runtime toolchain.
#[derive(Parser)]
#[command(name = "formrun", version, about = "Formrun form runtime toolchain")]
struct Cli {
    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a form schema file for structural problems
    Validate {
        /// Path to the form schema JSON file
        schema: PathBuf,
    },

    /// Print a schema's blocks and logic rules
    Inspect {
        /// Path to the form schema JSON file
        schema: PathBuf,
    },

    /// Run a headless fill session from an answers file
    Run {
        /// Path to the form schema JSON file
        schema: PathBuf,
        /// Path to a JSON object mapping block ids to answers
        #[arg(long)]
        answers: PathBuf,
        /// Persist session snapshots under this directory
        #[arg(long)]
        store_dir: Option<PathBuf>,
    },

    /// Show offline-store statistics for a form
    Stats {
        /// Directory holding the snapshot store
        store_dir: PathBuf,
        /// Form id to report on
        form_id: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let code = match cli.command {
        Commands::Validate { schema } => cmd_validate(&schema, cli.quiet),
        Commands::Inspect { schema } => cmd_inspect(&schema),
        Commands::Run {
            schema,
            answers,
            store_dir,
        } => runner::run_session(&schema, &answers, store_dir.as_deref(), cli.quiet).await,
        Commands::Stats { store_dir, form_id } => cmd_stats(&store_dir, &form_id).await,
    };
    process::exit(code);
}

fn load_schema(path: &Path) -> Result<FormSchema, String> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    FormSchema::from_json(&raw).map_err(|e| format!("invalid schema JSON: {}", e))
}

fn cmd_validate(path: &Path, quiet: bool) -> i32 {
    let schema = match load_schema(path) {
        Ok(schema) => schema,
        Err(message) => {
            eprintln!("error: {message}");
            return 2;
        }
    };
    let issues = schema.check();
    if issues.is_empty() {
        if !quiet {
            println!(
                "ok: {} ({} blocks, {} logic rules)",
                schema.id,
                schema.effective_blocks().len(),
                schema.logic.len()
            );
        }
        0
    } else {
        for issue in &issues {
            eprintln!("issue: {issue}");
        }
        1
    }
}

fn cmd_inspect(path: &Path) -> i32 {
    let schema = match load_schema(path) {
        Ok(schema) => schema,
        Err(message) => {
            eprintln!("error: {message}");
            return 2;
        }
    };
    println!("form {} (version {})", schema.id, schema.version);
    for (index, block) in schema.effective_blocks().iter().enumerate() {
        let required = if block.required { " [required]" } else { "" };
        println!(
            "  {:>3}. {}  {:?}{}  {}",
            index, block.id, block.block_type, required, block.question
        );
    }
    if !schema.logic.is_empty() {
        println!("logic:");
        for rule in &schema.logic {
            let conditions: Vec<String> = rule
                .conditions
                .iter()
                .map(|c| format!("{} {:?} {}", c.field, c.op, c.value))
                .collect();
            let actions: Vec<String> = rule
                .actions
                .iter()
                .map(|a| format!("{:?} {}", a.action, a.target))
                .collect();
            println!(
                "  {}: when {} then {}",
                rule.id,
                conditions.join(" and "),
                actions.join(", ")
            );
        }
    }
    0
}

async fn cmd_stats(store_dir: &Path, form_id: &str) -> i32 {
    let store = match JsonFileStore::new(store_dir) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("error: cannot open store: {e}");
            return 2;
        }
    };
    let records = match store.list(form_id).await {
        Ok(records) => records,
        Err(e) => {
            eprintln!("error: {e}");
            return 2;
        }
    };
    let unsynced = records.iter().filter(|r| !r.is_synced()).count();
    let completed = records.iter().filter(|r| r.is_completed()).count();
    println!("form {form_id}: {} snapshots", records.len());
    println!("  unsynced:  {unsynced}");
    println!("  completed: {completed}");
    for record in &records {
        println!(
            "  {} step {} ({:.0}%) updated {}",
            record.respondent_key, record.current_step, record.progress, record.updated_at
        );
    }
    0
}
