//! critq: inspect a schema and render criteria queries from the shell.
//!
//! # Usage
//!
//! ```bash
//! # List every field the schema resolves
//! critq fields --schema schema.toml
//!
//! # Render a query
//! critq render --schema schema.toml --entity Person --filter 'name=Ann' --order '^!age'
//!
//! # Its count query, as JSON
//! critq render --entity Person --filter 'age>=30|city=Oslo' --count --format json
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use critq::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "critq")]
#[command(version)]
#[command(about = "Typed criteria builder CLI", long_about = None)]
#[command(after_help = "EXAMPLES:
    critq fields --schema schema.toml --entity Person
    critq render --entity Person --filter 'name=Ann' --order '^!age'
    critq render --entity Person --filter 'id=[1,2,3]|name~An%' --count")]
struct Cli {
    /// Config file (defaults to ./critq.toml, then the user config dir)
    #[arg(short, long, env = "CRITQ_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Select,
    Delete,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve and list the fields of a schema
    Fields {
        /// TOML schema document (overrides the config)
        #[arg(short, long)]
        schema: Option<PathBuf>,

        /// Only this entity
        #[arg(short, long)]
        entity: Option<String>,

        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
    /// Build a query and print its text and bindings
    Render {
        /// TOML schema document (overrides the config)
        #[arg(short, long)]
        schema: Option<PathBuf>,

        /// Root entity
        #[arg(short, long)]
        entity: String,

        /// Filter expression, e.g. 'age>=30' or 'name=Ann|name=Bo'
        #[arg(long)]
        filter: Vec<String>,

        /// Sort expression, e.g. '^name' or '^!age'
        #[arg(long)]
        order: Vec<String>,

        #[arg(long, value_enum, default_value = "select")]
        kind: Kind,

        #[arg(long)]
        distinct: bool,

        /// Print the count query instead
        #[arg(long)]
        count: bool,

        #[arg(long)]
        first: Option<u64>,

        #[arg(long)]
        max: Option<u64>,

        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(&cli) {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "critq=debug",
        _ => "critq=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &Cli) -> CriteriaResult<()> {
    let config = match &cli.config {
        Some(path) => CriteriaConfig::load(path)?,
        None => CriteriaConfig::discover()?,
    };

    match &cli.command {
        Commands::Fields {
            schema,
            entity,
            format,
        } => {
            let schema = load_schema(&config, schema.as_ref())?;
            list_fields(schema, entity.as_deref(), *format)
        }
        Commands::Render {
            schema,
            entity,
            filter,
            order,
            kind,
            distinct,
            count,
            first,
            max,
            format,
        } => {
            let schema = load_schema(&config, schema.as_ref())?;
            let registry = FieldRegistry::new(schema);
            let kind = match kind {
                Kind::Select => QueryKind::Select,
                Kind::Delete => QueryKind::Delete,
            };
            let mut query = Query::dynamic(&registry, kind, &config.base_alias, entity);

            for expr in filter {
                parse_filter(expr)?.apply(entity, &mut query);
            }
            for expr in order {
                parse_sort(expr)?.apply(entity, &mut query);
            }
            if *distinct {
                query.distinct();
            }
            if let Some(n) = first {
                query.first_result(*n);
            }
            if let Some(n) = max {
                query.max_results(*n);
            }

            let statement = if *count {
                query.count_statement()?
            } else {
                query.statement()?
            };
            print_statement(&statement, *format);
            Ok(())
        }
    }
}

fn load_schema(config: &CriteriaConfig, path: Option<&PathBuf>) -> CriteriaResult<Schema> {
    match path {
        Some(path) => Schema::load(path),
        None => config.load_schema(),
    }
}

fn list_fields(schema: Schema, only: Option<&str>, format: OutputFormat) -> CriteriaResult<()> {
    let targets: Vec<(String, String)> = schema
        .entities()
        .into_iter()
        .filter(|e| only.is_none_or(|o| o == *e))
        .flat_map(|e| {
            schema
                .methods(e)
                .into_iter()
                .map(move |m| (e.to_string(), m.to_string()))
        })
        .collect();

    if targets.is_empty() {
        return Err(CriteriaError::config(match only {
            Some(entity) => format!("entity '{}' not in schema", entity),
            None => "schema declares no fields".to_string(),
        }));
    }

    let registry = FieldRegistry::new(schema);
    let mut local = LocalCache::default();
    let mut descriptors = Vec::with_capacity(targets.len());
    for (entity, method) in &targets {
        let field = DynField::new(entity.as_str(), method.as_str());
        descriptors.push(registry.get_or_init(&field, &mut local)?);
    }

    match format {
        OutputFormat::Json => {
            let rows: Vec<serde_json::Value> = descriptors
                .iter()
                .map(|d| {
                    serde_json::json!({
                        "entity": d.owner,
                        "accessor": d.method,
                        "field": d.field_name,
                        "type": d.field_type,
                        "generic": d.generic_type,
                        "temporal": d.temporal,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows).unwrap_or_default());
        }
        OutputFormat::Table => {
            let rows: Vec<[String; 5]> = descriptors
                .iter()
                .map(|d| {
                    [
                        d.owner.clone(),
                        d.method.clone(),
                        d.field_name.clone(),
                        d.field_type.clone(),
                        d.temporal.map(|t| t.to_string()).unwrap_or_default(),
                    ]
                })
                .collect();
            print_table(&["Entity", "Accessor", "Field", "Type", "Temporal"], &rows);

            let stats = registry.stats();
            println!();
            println!(
                "{} descriptor(s), {} specialized",
                stats.entries.to_string().cyan(),
                stats.specialized.to_string().cyan()
            );
        }
    }
    Ok(())
}

fn print_statement(statement: &Statement, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(statement).unwrap_or_default());
        }
        OutputFormat::Table => {
            println!("{}", "Query:".green().bold());
            println!("  {}", statement.text.white());

            if let Some(n) = statement.first_result {
                println!("  {} {}", "First result:".dimmed(), n);
            }
            if let Some(n) = statement.max_results {
                println!("  {} {}", "Max results:".dimmed(), n);
            }

            if statement.parameters.is_empty() {
                return;
            }
            println!();
            println!("{}", "Bindings:".cyan());
            let rows: Vec<[String; 3]> = statement
                .parameters
                .iter()
                .map(|p| {
                    [
                        format!(":{}", p.name),
                        p.value.to_string(),
                        p.temporal.map(|t| t.to_string()).unwrap_or_default(),
                    ]
                })
                .collect();
            print_table(&["Name", "Value", "Temporal"], &rows);
        }
    }
}

fn print_table<const N: usize>(header: &[&str; N], rows: &[[String; N]]) {
    let mut widths: Vec<usize> = header.iter().map(|h| h.len()).collect();
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let head: Vec<String> = header
        .iter()
        .zip(&widths)
        .map(|(h, w)| format!("{:width$}", h, width = *w))
        .collect();
    println!("{}", head.join(" │ ").white().bold());

    let sep: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
    println!("{}", sep.join("─┼─").dimmed());

    for row in rows {
        let cells: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{:width$}", c, width = *w))
            .collect();
        println!("{}", cells.join(" │ "));
    }
}
