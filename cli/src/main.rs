//! `oscar`: who is this, and where did we talk about it?
//!
//! Every command prints JSON on stdout. Logs go to stderr and are controlled
//! by `-v` or `RUST_LOG`.

use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt};

use oscar_retrieval::{Direction, Oscar, OscarConfig, SearchRequest, SearchSource, parse_cursor};

/// Identity resolution and evidence-based message search.
#[derive(Debug, Parser)]
#[command(name = "oscar")]
#[command(version)]
#[command(about = "Resolve informal names to contacts and search message history")]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file (defaults to <config dir>/oscar/config.toml).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Work out who a name or nickname refers to
    Resolve {
        query: String,

        /// Keep scanning every source even after a confident match.
        #[arg(long)]
        all_sources: bool,
    },

    /// Search message text
    Search {
        /// Terms to match; "quoted phrases" stay together.
        #[arg(default_value = "")]
        query: String,

        /// Match the whole query as one phrase.
        #[arg(long)]
        phrase: bool,

        /// Only messages with this contact (name, nickname or handle).
        #[arg(long)]
        contact: Option<String>,

        /// Only messages with this handle. Repeatable.
        #[arg(long = "handle")]
        handles: Vec<String>,

        /// Only messages from the last N days.
        #[arg(long)]
        days_back: Option<u32>,

        /// Only messages at or after this time (RFC 3339 or YYYY-MM-DD).
        #[arg(long, value_parser = parse_time)]
        since: Option<DateTime<Utc>>,

        #[arg(long, value_enum)]
        direction: Option<DirectionArg>,

        /// Which histories to search.
        #[arg(long, value_enum, default_value_t = SourceArg::All)]
        source: SourceArg,

        /// Neighbouring messages to show around each hit.
        #[arg(long, default_value_t = 0)]
        context: usize,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Find contacts by name
    Contacts { query: String },

    /// List recent conversations
    Conversations {
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Read the conversation with a contact
    Read {
        contact: String,

        #[arg(long)]
        limit: Option<usize>,

        /// Page cursor: the `oldest_timestamp` of the previous page.
        #[arg(long, value_parser = parse_time)]
        before: Option<DateTime<Utc>>,
    },

    /// Show messages with a contact, optionally around a phrase
    Context {
        contact: String,

        #[arg(long)]
        around: Option<String>,

        #[arg(long)]
        limit: Option<usize>,

        #[arg(long)]
        days_back: Option<u32>,
    },

    /// Show what was loaded
    Stats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DirectionArg {
    Sent,
    Received,
}

impl From<DirectionArg> for Direction {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::Sent => Direction::Outbound,
            DirectionArg::Received => Direction::Inbound,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SourceArg {
    Messages,
    Mail,
    All,
}

impl From<SourceArg> for SearchSource {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::Messages => SearchSource::Messages,
            SourceArg::Mail => SearchSource::Mail,
            SourceArg::All => SearchSource::All,
        }
    }
}

fn parse_time(value: &str) -> Result<DateTime<Utc>, String> {
    parse_cursor(value).ok_or_else(|| format!("not a date or RFC 3339 time: {value}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = OscarConfig::load_or_default(cli.config.as_deref())
        .context("failed to load configuration")?;
    debug!("Using configuration: {config:?}");
    let oscar = Oscar::open(config)
        .await
        .context("failed to open sources")?;

    run(&oscar, cli.command).await
}

async fn run(oscar: &Oscar, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Resolve { query, all_sources } => print(&oscar.resolve(&query, all_sources).await?),
        Command::Search {
            query,
            phrase,
            contact,
            handles,
            days_back,
            since,
            direction,
            source,
            context,
            limit,
        } => {
            let mut request = SearchRequest::new(query)
                .with_handles(handles)
                .with_sources(source.into())
                .with_context(context);
            if phrase {
                request = request.exact_phrase();
            }
            if let Some(contact) = contact {
                request = request.with_contact(contact);
            }
            if let Some(days) = days_back {
                request = request.with_days_back(days);
            }
            if let Some(since) = since {
                request = request.with_since(since);
            }
            if let Some(direction) = direction {
                request = request.with_direction(direction.into());
            }
            if let Some(limit) = limit {
                request = request.with_max_results(limit);
            }
            print(&oscar.search(request).await?)
        }
        Command::Contacts { query } => print(&oscar.search_contacts(&query).await?),
        Command::Conversations { limit } => print(&oscar.list_conversations(limit).await?),
        Command::Read {
            contact,
            limit,
            before,
        } => print(&oscar.read_conversation(&contact, limit, before).await?),
        Command::Context {
            contact,
            around,
            limit,
            days_back,
        } => print(
            &oscar
                .get_context(&contact, around.as_deref(), limit, days_back)
                .await?,
        ),
        Command::Stats => print(&oscar.stats().await?),
    }
}

fn print<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
