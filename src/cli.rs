//! Command-line interface parsing for ocfetch
//!
//! This module handles parsing of CLI arguments using clap and turns them into
//! the typed settings the library works with.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::api::{Query, DEFAULT_PAGE_SIZE};
use crate::cache::{CacheError, CacheManager};
use crate::flatten::{FlattenConfig, MultiValueMode, DEFAULT_DELIMITER};
use crate::matching::DEFAULT_ID_COLUMN;

/// Error types for CLI argument parsing
#[derive(Debug, Error)]
pub enum CliError {
    /// The specified multi-value mode is not recognized
    #[error("Invalid mode: '{0}'. Valid modes: first, last, json, concat, column_val")]
    InvalidMode(String),

    /// A `--keyed` argument is not of the form ATTRIBUTE=MODE
    #[error("Invalid keyed mode: '{0}'. Expected ATTRIBUTE=MODE, e.g. 'Motif=column_val'")]
    InvalidKeyedMode(String),

    /// No cache directory was given and none could be determined
    #[error("Could not determine a cache directory; pass --cache-dir")]
    NoCacheDir,

    /// The `--prefix` value cannot be used as a cache prefix
    #[error("Invalid prefix: {0}")]
    InvalidPrefix(#[from] CacheError),
}

/// ocfetch - Fetch, cache and flatten Open Context search records
#[derive(Parser, Debug)]
#[command(name = "ocfetch")]
#[command(about = "Fetch, cache and flatten Open Context search records")]
#[command(version)]
pub struct Cli {
    /// Directory for cached API responses (defaults to the platform cache directory)
    #[arg(long, global = true, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Prefix for cache file names, slugified (defaults to today's date)
    #[arg(long, global = true)]
    pub prefix: Option<String>,

    /// Milliseconds to pause before each network request
    #[arg(long, global = true, default_value_t = 250, value_name = "MS")]
    pub sleep_ms: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch every record of a search and write it as CSV
    Fetch(FetchArgs),
    /// List attributes advertised by a search's facets
    Attributes(AttributesArgs),
    /// Delete cached responses for the current prefix
    ClearCache(ClearCacheArgs),
    /// Match files in a directory to catalog identifiers
    MatchFiles(MatchFilesArgs),
}

#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Open Context search URL, without pagination parameters
    pub url: String,

    /// Attribute slug to include in each record (repeatable)
    #[arg(short = 'a', long = "attribute", value_name = "SLUG")]
    pub attributes: Vec<String>,

    /// Records per page
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    pub page_size: u32,

    /// Restrict to an item category
    #[arg(long)]
    pub cat: Option<String>,

    /// Restrict to a project
    #[arg(long)]
    pub proj: Option<String>,

    /// Restrict to an item type
    #[arg(long = "type", value_name = "TYPE")]
    pub item_type: Option<String>,

    /// Response types to request, comma separated (defaults to metadata,uri-meta)
    #[arg(long, value_delimiter = ',', value_name = "TYPES")]
    pub response: Vec<String>,

    /// Ask the server to pre-join multi-valued attributes
    #[arg(long)]
    pub flatten_attributes: bool,

    /// Mode for multi-valued text attributes
    #[arg(long, default_value = "concat")]
    pub mode: String,

    /// Mode for multi-valued numeric attributes
    #[arg(long, default_value = "first")]
    pub number_mode: String,

    /// Per-attribute mode override, e.g. 'Motif=column_val' (repeatable)
    #[arg(long, value_name = "ATTRIBUTE=MODE")]
    pub keyed: Vec<String>,

    /// Delimiter used by the concat mode
    #[arg(long, default_value = DEFAULT_DELIMITER)]
    pub delimiter: String,

    /// Keep 'context label' as a single column
    #[arg(long)]
    pub no_split_contexts: bool,

    /// Order columns with well-known record fields first
    #[arg(long)]
    pub standard_order: bool,

    /// CSV output file (defaults to stdout)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct AttributesArgs {
    /// Open Context search URL
    pub url: String,

    /// List commonly used project attributes instead of standard ones
    #[arg(long)]
    pub common: bool,

    /// Minimum share of records using an attribute, with --common
    #[arg(long, default_value_t = 0.2)]
    pub min_portion: f64,

    /// Include von den Driesch bone measurements in the standard attributes
    #[arg(long)]
    pub bone_measures: bool,
}

#[derive(Args, Debug)]
pub struct ClearCacheArgs {
    /// Keep the current prefix and delete every other cached response instead
    #[arg(long)]
    pub keep: bool,
}

#[derive(Args, Debug)]
pub struct MatchFilesArgs {
    /// Directory holding the files to match
    pub dir: PathBuf,

    /// CSV file with catalog identifiers
    #[arg(long, value_name = "FILE")]
    pub reference: PathBuf,

    /// Reference column holding the identifiers
    #[arg(long, default_value = DEFAULT_ID_COLUMN)]
    pub column: String,

    /// CSV output file for matches (defaults to stdout)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

/// Parses a mode argument into a MultiValueMode.
///
/// # Returns
/// * `Ok(MultiValueMode)` if the string names a valid mode
/// * `Err(CliError::InvalidMode)` if it doesn't
pub fn parse_mode_arg(s: &str) -> Result<MultiValueMode, CliError> {
    s.parse().map_err(|_| CliError::InvalidMode(s.to_string()))
}

/// Parses an `ATTRIBUTE=MODE` argument.
///
/// The split happens at the last `=`, so attribute names may contain one.
pub fn parse_keyed_arg(s: &str) -> Result<(String, MultiValueMode), CliError> {
    let invalid = || CliError::InvalidKeyedMode(s.to_string());
    let (attribute, mode) = s.rsplit_once('=').ok_or_else(invalid)?;
    let attribute = attribute.trim();
    if attribute.is_empty() {
        return Err(invalid());
    }
    let mode: MultiValueMode = mode.parse().map_err(|_| invalid())?;
    Ok((attribute.to_string(), mode))
}

/// Cache and network settings shared by all subcommands
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub cache: CacheManager,
    pub sleep: Duration,
}

impl ClientSettings {
    /// Creates ClientSettings from parsed CLI arguments.
    ///
    /// # Returns
    /// * `Err(CliError::NoCacheDir)` if no directory was given and the
    ///   platform cache directory is unknown
    /// * `Err(CliError::InvalidPrefix)` if `--prefix` has no letters or digits
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        let cache = match &cli.cache_dir {
            Some(dir) => CacheManager::with_dir(dir.clone()),
            None => CacheManager::new().ok_or(CliError::NoCacheDir)?,
        };
        let cache = match &cli.prefix {
            Some(prefix) => cache.with_prefix(prefix)?,
            None => cache,
        };
        Ok(Self {
            cache,
            sleep: Duration::from_millis(cli.sleep_ms),
        })
    }
}

/// Everything the `fetch` subcommand needs
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub query: Query,
    pub flatten: FlattenConfig,
    pub standard_order: bool,
    pub output: Option<PathBuf>,
}

impl FetchSettings {
    /// Creates FetchSettings from `fetch` arguments, validating mode names
    pub fn from_args(args: &FetchArgs) -> Result<Self, CliError> {
        let mut query = Query::new(args.url.clone())
            .with_attributes(args.attributes.iter().cloned())
            .with_page_size(args.page_size)
            .with_flatten_attributes(args.flatten_attributes);
        if let Some(cat) = &args.cat {
            query = query.with_category(cat.clone());
        }
        if let Some(proj) = &args.proj {
            query = query.with_project(proj.clone());
        }
        if let Some(item_type) = &args.item_type {
            query = query.with_item_type(item_type.clone());
        }
        if !args.response.is_empty() {
            query = query.with_response_types(args.response.iter().cloned());
        }

        let mut flatten = FlattenConfig::default()
            .with_default_mode(parse_mode_arg(&args.mode)?)
            .with_number_mode(parse_mode_arg(&args.number_mode)?)
            .with_delimiter(args.delimiter.clone())
            .with_split_contexts(!args.no_split_contexts);
        for keyed in &args.keyed {
            let (attribute, mode) = parse_keyed_arg(keyed)?;
            flatten = flatten.with_keyed_mode(attribute, mode);
        }

        Ok(FetchSettings {
            query,
            flatten,
            standard_order: args.standard_order,
            output: args.output.clone(),
        })
    }
}
