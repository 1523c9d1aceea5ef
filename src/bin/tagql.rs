//! tagql — compile tag expressions to SQL
//!
//! # Usage
//!
//! ```bash
//! # Compile an expression file (or stdin) with the demo catalog
//! tagql compile expr.json
//! echo '{"tag": {"builderID": "user_age", "params": {"operator": "GT", "value": 30}}}' \
//!     | tagql compile -
//!
//! # List the available builders
//! tagql catalog
//! ```

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use tracing_subscriber::EnvFilter;

use tagql::prelude::*;

#[derive(Parser)]
#[command(name = "tagql")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Compile segmentation tag expressions into one SQL query", long_about = None)]
#[command(after_help = "EXAMPLES:
    tagql compile expr.json                 # Compile with the configured catalog
    tagql compile - --format json < e.json  # Read stdin, print JSON
    tagql simplify expr.json                # Flatten nested set operations
    tagql catalog --json                    # Dump categories and builders")]
struct Cli {
    /// Config file (defaults to <config dir>/tagql/config.toml)
    #[arg(short, long, global = true, env = "TAGQL_CONFIG")]
    config: Option<PathBuf>,

    /// Override the configured dialect
    #[arg(short, long, global = true, value_enum)]
    dialect: Option<CliDialect>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum CliDialect {
    Bigquery,
    Postgres,
    Mysql,
    Snowflake,
}

impl From<CliDialect> for Dialect {
    fn from(val: CliDialect) -> Self {
        match val {
            CliDialect::Bigquery => Dialect::BigQuery,
            CliDialect::Postgres => Dialect::Postgres,
            CliDialect::Mysql => Dialect::MySql,
            CliDialect::Snowflake => Dialect::Snowflake,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile an expression into SQL and arguments
    Compile {
        /// Expression JSON file, or `-` for stdin
        input: String,
        /// Compile the tree as written
        #[arg(long)]
        no_simplify: bool,
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Print the simplified expression
    Simplify {
        /// Expression JSON file, or `-` for stdin
        input: String,
    },
    /// Check expression structure and every tag's parameters
    Validate {
        /// Expression JSON file, or `-` for stdin
        input: String,
    },
    /// List categories and builders
    Catalog {
        /// Print the full metadata as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "tagql=debug" } else { "tagql=warn" };
    let filter = std::env::var("TAGQL_LOG")
        .ok()
        .and_then(|f| EnvFilter::try_new(f).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let mut config = TagqlConfig::discover(cli.config.as_deref())?;
    if let Some(dialect) = cli.dialect {
        config.dialect = dialect.into();
    }
    let registry = Arc::new(load_registry(&config)?);
    let ctx = Context::background();

    match cli.command {
        Commands::Compile {
            input,
            no_simplify,
            format,
        } => {
            let mut expr = read_expression(&input)?;
            if config.simplify && !no_simplify {
                expr = expr.simplify();
            }
            let processor = BaseSqlProcessor::new(registry, config.dialect.sql_dialect());
            let sql = processor.process(&ctx, &expr)?;
            print_sql(&sql, format)?;
        }
        Commands::Simplify { input } => {
            let expr = read_expression(&input)?;
            println!("{}", serde_json::to_string_pretty(&expr.simplify())?);
        }
        Commands::Validate { input } => {
            let expr = read_expression(&input)?;
            validate_tags(&registry, &ctx, &expr)?;
            println!("{} expression is valid", "✓".green());
        }
        Commands::Catalog { json } => {
            let grouped = registry.get_categories_with_builders(&ctx);
            if json {
                println!("{}", serde_json::to_string_pretty(&grouped)?);
            } else {
                for entry in &grouped {
                    println!(
                        "{} {}",
                        entry.category.name.cyan().bold(),
                        entry.category.id.dimmed()
                    );
                    for md in &entry.builders {
                        println!("  {:<20} {}", md.id.yellow(), md.name);
                    }
                }
            }
        }
    }
    Ok(())
}

fn load_registry(config: &TagqlConfig) -> Result<Registry> {
    let registry = Registry::standard();
    let catalog = match &config.catalog_path {
        Some(path) => Catalog::load(path)
            .with_context(|| format!("loading catalog {}", path.display()))?,
        None => Catalog::demo()?,
    };
    catalog.install(&registry, config.placeholder)?;
    Ok(registry)
}

fn read_expression(input: &str) -> Result<Expression> {
    let json = if input == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(input).with_context(|| format!("reading {input}"))?
    };
    Ok(tagql::parse_expression(&json)?)
}

/// Build every tag once so parameter errors surface without printing SQL.
fn validate_tags(registry: &Registry, ctx: &Context, expr: &Expression) -> Result<()> {
    match expr.kind()? {
        ExpressionKind::Tag(tag) => {
            let builder = registry
                .get_builder(&tag.builder_id)
                .ok_or_else(|| TagError::BuilderNotFound(tag.builder_id.clone()))?;
            let sql_builder = builder
                .as_sql_builder()
                .ok_or_else(|| TagError::UnsupportedBuilder(tag.builder_id.clone()))?;
            sql_builder
                .build_sql(ctx, &tag.params)
                .with_context(|| format!("tag {}", tag.builder_id))?;
            Ok(())
        }
        ExpressionKind::Set(_, children) => children
            .iter()
            .try_for_each(|child| validate_tags(registry, ctx, child)),
    }
}

fn print_sql(sql: &Sql, format: OutputFormat) -> Result<()> {
    println!("{}", render_sql(sql, format)?);
    Ok(())
}

/// JSON carries the query exactly as compiled; text is compacted for reading.
fn render_sql(sql: &Sql, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Json => {
            let out = serde_json::json!({
                "query": sql.query,
                "args": sql.args,
            });
            serde_json::to_string_pretty(&out)?
        }
        OutputFormat::Text => {
            let mut lines = vec![compact_sql_query(&sql.query).white().bold().to_string()];
            for (i, arg) in sql.args.iter().enumerate() {
                lines.push(format!("  {} {}", format!("[{}]", i + 1).dimmed(), arg));
            }
            lines.join("\n")
        }
    })
}
