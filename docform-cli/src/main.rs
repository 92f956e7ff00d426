use std::path::PathBuf;

use clap::{Parser, Subcommand};
use docform_cli::{
    commands,
    ctx::{AppContext, PathConfig},
};

/// Schema-driven form editing from the command line.
///
/// Field ids are printed by `outline` and are stable for a given `--salt`.
#[derive(Parser, Debug)]
#[command(name = "docform", version, about)]
struct Cli {
    /// Configuration file.
    #[arg(short, long, global = true, default_value = ".docform.toml")]
    config: PathBuf,

    /// Schema URL or path. Defaults to the input's `$schema`.
    #[arg(short, long, global = true)]
    schema: Option<String>,

    /// JSON document to load. Without it an empty document is used.
    #[arg(short, long, global = true)]
    input: Option<PathBuf>,

    /// Write the resulting document here instead of printing it.
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Prefix of the generated field ids (`-` and other separators are dropped).
    #[arg(long, global = true, default_value = "form")]
    salt: String,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the field tree.
    Outline {
        /// Print rows as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Print the default document of the schema.
    Default,
    /// Add an offered field to a container.
    Add {
        /// Id of the container.
        parent: String,
        /// Offered option, as listed in the container's options.
        option: String,
        /// JSON value instead of the generated default.
        #[arg(long)]
        value: Option<String>,
        /// Index among the existing children.
        #[arg(long)]
        position: Option<usize>,
    },
    /// Delete a field.
    Delete { id: String },
    /// Copy a field next to itself.
    Duplicate { id: String },
    /// Rename a dictionary entry.
    Rename { id: String, key: String },
    /// Set the value of a field.
    Set { id: String, value: String },
    /// Move a field among its siblings.
    Sort {
        id: String,
        position: usize,
        /// Treat `position` as a drag-and-drop gap.
        #[arg(long)]
        gap: bool,
    },
    /// Print the field focus moves to.
    Focus {
        id: String,
        #[arg(short, long)]
        reverse: bool,
    },
    /// Flatten a worker validation error (read from stdin without MESSAGE).
    Errors { message: Option<String> },
    /// Print the JSON Schema of the configuration file.
    ConfigSchema,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let paths = PathConfig {
        config: cli.config,
        input: cli.input,
        output: cli.output,
    };
    let mut ctx = AppContext::new(paths, cli.salt)?;
    let schema = cli.schema.as_deref();

    match cli.command {
        Commands::Outline { json } => commands::outline(&mut ctx, schema, json).await,
        Commands::Default => commands::default_document(&mut ctx, schema).await,
        Commands::Add {
            parent,
            option,
            value,
            position,
        } => commands::add(&mut ctx, schema, &parent, &option, value.as_deref(), position).await,
        Commands::Delete { id } => commands::delete(&mut ctx, schema, &id).await,
        Commands::Duplicate { id } => commands::duplicate(&mut ctx, schema, &id).await,
        Commands::Rename { id, key } => commands::rename(&mut ctx, schema, &id, &key).await,
        Commands::Set { id, value } => commands::set(&mut ctx, schema, &id, &value).await,
        Commands::Sort { id, position, gap } => {
            commands::sort(&mut ctx, schema, &id, position, gap).await
        }
        Commands::Focus { id, reverse } => commands::focus(&mut ctx, schema, &id, reverse).await,
        Commands::Errors { message } => commands::errors(message),
        Commands::ConfigSchema => commands::config_schema(),
    }
}
