use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use opcc_rs::{compile_reader, CompileOptions};

mod report;
use report::{build_report, open_source, render_text, Order};

#[derive(Parser, Debug)]
#[command(author, version, about = "Compile an opcode encoding description", long_about = None)]
struct Cli {
    /// Source file
    #[arg(short, long, value_name = "FILE")]
    input: PathBuf,
    /// Output format: text or json
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
    /// Listing order
    #[arg(long, value_enum, default_value_t = SortOrder::Encoding)]
    sort: SortOrder,
    /// Write output to file instead of stdout
    #[arg(long, value_name = "FILE")]
    out: Option<PathBuf>,
    /// Maximum nesting of macro expansions
    #[arg(long, default_value_t = 64usize)]
    max_expansion_depth: usize,
    /// Skip building the encoding tree
    #[arg(long)]
    no_tree: bool,
    /// Log block-level progress (RUST_LOG overrides)
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SortOrder {
    Encoding,
    Name,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let source = open_source(&cli.input)?;
    tracing::debug!(path = %cli.input.display(), "compiling");
    let options = CompileOptions {
        max_expansion_depth: cli.max_expansion_depth,
        build_tree: !cli.no_tree,
    };
    let compilation = compile_reader(source, options);

    let order = match cli.sort {
        SortOrder::Encoding => Order::Encoding,
        SortOrder::Name => Order::Name,
    };
    let text = match cli.format {
        OutputFormat::Text => render_text(&compilation, order),
        OutputFormat::Json => serde_json::to_string_pretty(&build_report(&compilation, order))?,
    };
    match &cli.out {
        Some(path) => std::fs::write(path, text)?,
        None => print!("{text}"),
    }

    if !compilation.is_ok() {
        eprintln!("{} error(s)", compilation.error_count());
        std::process::exit(1);
    }
    Ok(())
}
