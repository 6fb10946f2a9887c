//! Binary entry point for the misql command-line tool.
#![forbid(unsafe_code)]

use std::error::Error;
use std::path::PathBuf;
use std::sync::OnceLock;

use clap::{Parser, Subcommand, ValueEnum};
use misql::{
    admin::{stats, verify, StatsReport, VerifyReport},
    Db, DbOptions,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "misql",
    version,
    about = "Inspect and edit a misql key-value database",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "TOML file with database options")]
    config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for structured responses"
    )]
    format: OutputFormat,

    #[arg(value_name = "DB", help = "Path of the database file")]
    db_path: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the value stored under KEY.
    Get { key: String },
    /// Store VALUE under KEY.
    Set { key: String, value: String },
    /// Remove KEY.
    Del { key: String },
    /// Report tree, freelist and file statistics.
    Stats,
    /// Check tree and freelist invariants.
    Verify,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Serialize)]
struct GetOutput<'a> {
    key: &'a str,
    found: bool,
    value: Option<String>,
}

#[derive(Serialize)]
struct SetOutput<'a> {
    key: &'a str,
    root_page: u64,
}

#[derive(Serialize)]
struct DelOutput<'a> {
    key: &'a str,
    deleted: bool,
}

fn main() {
    install_tracing_subscriber();
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn install_tracing_subscriber() {
    static INIT: OnceLock<()> = OnceLock::new();
    INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    });
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let options = match &cli.config {
        Some(path) => DbOptions::from_toml_file(path)?,
        None => DbOptions::default(),
    };
    let mut db = Db::open(&cli.db_path, options)?;

    match &cli.command {
        Command::Get { key } => {
            let value = db.get(key.as_bytes())?;
            let out = GetOutput {
                key,
                found: value.is_some(),
                value: value.map(|v| String::from_utf8_lossy(&v).into_owned()),
            };
            emit(cli.format, &out, || match &out.value {
                Some(value) => println!("{value}"),
                None => println!("(not found)"),
            })?;
        }
        Command::Set { key, value } => {
            db.set(key.as_bytes(), value.as_bytes())?;
            let out = SetOutput {
                key,
                root_page: db.root().0,
            };
            emit(cli.format, &out, || println!("OK"))?;
        }
        Command::Del { key } => {
            let deleted = db.delete(key.as_bytes())?;
            let out = DelOutput { key, deleted };
            emit(cli.format, &out, || {
                println!("{}", if deleted { "deleted" } else { "(not found)" })
            })?;
        }
        Command::Stats => {
            let report = stats(&db)?;
            emit(cli.format, &report, || print_stats_text(&report))?;
        }
        Command::Verify => {
            let report = verify(&db)?;
            emit(cli.format, &report, || print_verify_text(&report))?;
            if !report.success {
                db.close()?;
                std::process::exit(2);
            }
        }
    }

    db.close()?;
    Ok(())
}

fn emit<T, F>(format: OutputFormat, value: &T, printer: F) -> Result<(), Box<dyn Error>>
where
    T: Serialize,
    F: Fn(),
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
        }
        OutputFormat::Text => printer(),
    }
    Ok(())
}

fn print_stats_text(report: &StatsReport) {
    println!(
        "Pager: page_size={} file_pages={} flushed={} mapped_bytes={}",
        report.pager.page_size,
        report.pager.file_pages,
        report.pager.flushed_pages,
        report.pager.mapped_bytes
    );
    println!(
        "Tree: root={} height={} internal={} leaves={} keys={} key_bytes={} value_bytes={}",
        report.tree.root_page,
        report.tree.height,
        report.tree.internal_pages,
        report.tree.leaf_pages,
        report.tree.keys,
        report.tree.key_bytes,
        report.tree.value_bytes
    );
    println!(
        "Freelist: head={} nodes={} free_pages={}",
        report.freelist.head_page, report.freelist.nodes, report.freelist.free_pages
    );
    println!(
        "Filesystem: db_size={} db_path={}",
        report.filesystem.db_size_bytes, report.filesystem.db_path
    );
}

fn print_verify_text(report: &VerifyReport) {
    println!(
        "Verify => success={} internal={} leaves={} keys={} freelist_nodes={} free_pages={} flushed={}",
        report.success,
        report.counts.internal_pages,
        report.counts.leaf_pages,
        report.counts.keys,
        report.counts.freelist_nodes,
        report.counts.free_pages,
        report.counts.flushed_pages,
    );
    for finding in &report.findings {
        println!("- {:?}: {}", finding.severity, finding.message);
    }
}
