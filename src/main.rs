//! ocfetch - Fetch, cache and flatten Open Context search records
//!
//! Walks every page of an Open Context search through the local response
//! cache and writes the flattened records as CSV.

use std::io;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use ocfetch::api::OpenContextClient;
use ocfetch::cli::{
    AttributesArgs, ClearCacheArgs, Cli, ClientSettings, Command, FetchArgs, FetchSettings,
    MatchFilesArgs,
};
use ocfetch::export::{write_csv, write_csv_file};
use ocfetch::flatten::flatten;
use ocfetch::matching::{match_directory, ReferenceTable};

/// Sets up logging to stderr, `RUST_LOG` overrides the default `info` level
fn init_logging() {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_writer(io::stderr)
        .init();
}

async fn run_fetch(client: &OpenContextClient, args: &FetchArgs) -> Result<()> {
    let settings = FetchSettings::from_args(args)?;

    let result = client
        .fetch_all(&settings.query)
        .await
        .with_context(|| format!("fetching {}", settings.query.base_url()))?;
    if !result.is_complete() {
        warn!(
            fetched = result.records.len(),
            total = result.total,
            "result set is incomplete"
        );
    }

    let mut table = flatten(&result.records, &settings.flatten);
    if settings.standard_order {
        table.standard_order();
    }

    match &settings.output {
        Some(path) => write_csv_file(&table, path)
            .with_context(|| format!("writing {}", path.display()))?,
        None => write_csv(&table, io::stdout().lock())?,
    }
    info!(
        records = result.records.len(),
        network_requests = client.network_requests(),
        "fetch complete"
    );
    Ok(())
}

async fn run_attributes(client: &OpenContextClient, args: &AttributesArgs) -> Result<()> {
    let attributes = if args.common {
        client.common_attributes(&args.url, args.min_portion).await?
    } else {
        client.standard_attributes(&args.url, args.bone_measures).await?
    };
    for attribute in attributes {
        println!("{}\t{}", attribute.slug, attribute.label);
    }
    Ok(())
}

fn run_clear_cache(client: &OpenContextClient, args: &ClearCacheArgs) -> Result<()> {
    let removed = if args.keep {
        client.clear_stale_cache()?
    } else {
        client.clear_cache(client.cache().prefix())?
    };
    println!("removed {} cached responses", removed);
    Ok(())
}

fn run_match_files(args: &MatchFilesArgs) -> Result<()> {
    let reference = ReferenceTable::from_csv_path(&args.reference, &args.column)
        .with_context(|| format!("loading {}", args.reference.display()))?;
    let report = match_directory(&args.dir, &reference)?;

    match &args.output {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("creating {}", path.display()))?;
            report.write_csv(io::BufWriter::new(file))?;
        }
        None => report.write_csv(io::stdout().lock())?,
    }

    if !report.missing.is_empty() {
        eprintln!("{} files without a matching identifier:", report.missing.len());
        for path in &report.missing {
            eprintln!("  {}", path.display());
        }
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    if let Command::MatchFiles(args) = &cli.command {
        return run_match_files(args);
    }

    let settings = ClientSettings::from_cli(&cli)?;
    let client = OpenContextClient::new(settings.cache).with_sleep(settings.sleep);

    match &cli.command {
        Command::Fetch(args) => run_fetch(&client, args).await,
        Command::Attributes(args) => run_attributes(&client, args).await,
        Command::ClearCache(args) => run_clear_cache(&client, args),
        Command::MatchFiles(args) => run_match_files(args),
    }
}
