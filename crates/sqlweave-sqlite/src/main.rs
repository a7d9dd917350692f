//! sqlweave CLI
//!
//! Inspects a SQLite database and previews or runs metadata-driven commands.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use sqlweave_core::execution::RowSet;
use sqlweave_core::{
    ArgumentValue, CommandBuilder, DataSourceSettings, DeleteOptions, DesiredColumns,
    InsertOptions, LimitOption, Limits, SortExpression, UpdateOptions, UpsertOptions,
};
use sqlweave_sqlite::SqliteDataSource;

/// Metadata-driven SQL for SQLite.
#[derive(Parser)]
#[command(name = "sqlweave")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database URL (SQLite path or connection string).
    #[arg(short, long, env = "DATABASE_URL", default_value = "sqlite:db.sqlite3")]
    database: String,

    /// JSON settings file.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Reject properties and filter keys that match no column.
    #[arg(long)]
    strict: bool,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List tables and views.
    Tables,

    /// Show the columns and indexes of a table or view.
    Describe {
        /// Table or view name.
        table: String,
    },

    /// Print the SQL a command would run, without running it.
    Preview {
        /// Operation to prepare.
        #[arg(value_enum)]
        operation: Operation,

        /// Target table.
        table: String,

        /// Argument as a JSON object.
        #[arg(short, long, default_value = "{}")]
        json: String,

        /// Columns to return; every column if omitted.
        #[arg(short, long)]
        returning: Vec<String>,
    },

    /// Run a query and print the rows.
    Query {
        /// Table or view name.
        table: String,

        /// Filter object as JSON.
        #[arg(short, long)]
        filter: Option<String>,

        /// Sort expression such as "Name DESC"; repeatable.
        #[arg(short, long)]
        sort: Vec<String>,

        /// Rows to return.
        #[arg(short, long)]
        take: Option<i64>,

        /// Rows to skip.
        #[arg(long)]
        skip: Option<i64>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Operation {
    Select,
    Insert,
    Update,
    Delete,
    Upsert,
}

fn load_settings(cli: &Cli) -> anyhow::Result<DataSourceSettings> {
    let settings = match &cli.settings {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            DataSourceSettings::from_json(&json)?
        }
        None => DataSourceSettings::default(),
    };
    Ok(if cli.strict {
        settings.strict(true)
    } else {
        settings
    })
}

fn argument(json: &str) -> anyhow::Result<ArgumentValue> {
    let value: serde_json::Value = serde_json::from_str(json).context("parsing JSON argument")?;
    Ok(ArgumentValue::from_json(&value)?)
}

fn print_rows(rows: &RowSet) {
    if !rows.columns().is_empty() {
        println!("{}", rows.columns().join(" | "));
        println!("{:-<60}", "");
    }
    for row in rows.rows() {
        let values: Vec<String> = (0..rows.columns().len())
            .filter_map(|i| row.value(i).map(ToString::to_string))
            .collect();
        println!("{}", values.join(" | "));
    }
    println!("({} rows)", rows.len());
}

fn preview(
    source: &SqliteDataSource,
    operation: Operation,
    table: &str,
    argument: ArgumentValue,
    returning: &[String],
) -> anyhow::Result<()> {
    let context = source.context();
    let command: Box<dyn CommandBuilder> = match operation {
        Operation::Select => Box::new(context.from(table)?.with_filter(argument)),
        Operation::Insert => Box::new(context.insert(table, argument, InsertOptions::default())?),
        Operation::Update => Box::new(context.update(table, argument, UpdateOptions::default())?),
        Operation::Delete => Box::new(context.delete(table, argument, DeleteOptions::default())?),
        Operation::Upsert => Box::new(context.upsert(table, argument, UpsertOptions::default())?),
    };
    let desired = match (operation, returning.is_empty()) {
        (Operation::Select, true) => DesiredColumns::All,
        (_, true) => DesiredColumns::None,
        (_, false) => DesiredColumns::named(returning),
    };
    let chain = command.prepare(&desired)?;
    for (index, token) in chain.tokens().iter().enumerate() {
        println!("-- {}: {}", index + 1, token.operation_name);
        println!("{}", token.command_text);
        for parameter in &token.parameters {
            println!("--   {} = {}", parameter.name, parameter.value);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let settings = load_settings(&cli)?;
    let source = SqliteDataSource::connect(&cli.database, settings).await?;

    match cli.command {
        Commands::Tables => {
            let objects = source.cache().list_objects()?;
            if objects.is_empty() {
                info!("No tables found.");
            }
            for object in &objects {
                println!("{:<40} {}", object.name, object.kind);
            }
        }

        Commands::Describe { table } => {
            let metadata = source.cache().get_table_or_view(&table)?;
            println!("{}", metadata.quoted_name());
            println!("{:-<60}", "");
            for column in metadata.columns() {
                let mut flags = Vec::new();
                if column.is_primary_key {
                    flags.push("primary key");
                }
                if column.is_identity {
                    flags.push("identity");
                }
                if column.is_computed {
                    flags.push("computed");
                }
                if !column.is_nullable {
                    flags.push("not null");
                }
                println!(
                    " {:<30} {:<15} {}",
                    column.sql_name,
                    column.type_name,
                    flags.join(", ")
                );
            }
            let indexes = source.cache().get_indexes_for_table(&table)?;
            for index in indexes.iter() {
                let columns: Vec<&str> = index.columns.iter().map(|c| c.name.as_str()).collect();
                let unique = if index.is_unique { "unique " } else { "" };
                println!(" {unique}index {} ({})", index.name, columns.join(", "));
            }
        }

        Commands::Preview {
            operation,
            table,
            json,
            returning,
        } => {
            preview(&source, operation, &table, argument(&json)?, &returning)?;
        }

        Commands::Query {
            table,
            filter,
            sort,
            take,
            skip,
        } => {
            let mut query = source.context().from(&table)?;
            if let Some(filter) = filter {
                query = query.with_filter(argument(&filter)?);
            }
            let sorting = sort
                .iter()
                .map(|s| SortExpression::parse(s))
                .collect::<Result<Vec<_>, _>>()?;
            query = query.with_sorting(sorting);
            if take.is_some() || skip.is_some() {
                query = query.with_limits(Limits {
                    option: LimitOption::Rows,
                    skip,
                    take,
                    seed: None,
                });
            }
            let rows = source.query(&query).await?;
            print_rows(&rows);
        }
    }

    Ok(())
}
