//! `eventboard` command-line entry point.
//!
//! # Responsibility
//! - Wire config, storage, geocoding and logging from `eventboard_core`.
//! - Expose saving and the named scopes as subcommands.

use clap::{Parser, Subcommand};
use eventboard_core::{
    init_logging, Clock, CoreConfig, Event, EventId, EventService, FixedClock, MultiGeocoder,
    Recurrence, SqliteEventRepository, SystemClock,
};
use log::error;
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Parser)]
#[command(author, version, about = "Calendar events with scopes and geocoding", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// JSON config file.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Database file; overrides `db_path` from the config.
    #[arg(long, value_name = "FILE")]
    db: Option<PathBuf>,

    /// Pin "now" to this epoch-millisecond instant.
    #[arg(long, value_name = "EPOCH_MS")]
    now: Option<i64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Save a new event and geocode its location.
    Add {
        #[arg(long)]
        title: String,
        #[arg(long)]
        location: String,
        /// Start as epoch milliseconds.
        #[arg(long, value_name = "EPOCH_MS", conflicts_with = "in_days")]
        at: Option<i64>,
        /// Start this many days from now.
        #[arg(long, value_name = "DAYS")]
        in_days: Option<i64>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        recurring: bool,
    },
    /// Events after now.
    Future,
    /// Events at or before now, most recent first.
    Past,
    /// Soonest upcoming events.
    Next {
        #[arg(default_value_t = eventboard_core::DEFAULT_NEXT_LIMIT)]
        limit: u32,
    },
    Recurring,
    Special,
    NextFiveSpecial,
    NextFourRecurring,
    /// Print one event as JSON.
    Show { id: EventId },
    Delete { id: EventId },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("event=cli_run module=cli status=error error={err}");
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let mut config = match &cli.config {
        Some(path) => CoreConfig::load(path)?,
        None => CoreConfig::default(),
    };
    if let Some(db) = cli.db {
        config.db_path = Some(db);
    }
    if let Some(log_dir) = &config.log_dir {
        init_logging(&config.log_level, log_dir)?;
    }

    let conn = config.open_database()?;
    let repo = SqliteEventRepository::try_new(&conn)?;
    let geocoder = config.build_geocoder()?;

    match cli.now {
        Some(now) => execute(
            EventService::with_clock(repo, geocoder, FixedClock(now)),
            cli.command,
        ),
        None => execute(
            EventService::with_clock(repo, geocoder, SystemClock),
            cli.command,
        ),
    }
}

fn execute<C: Clock>(
    service: EventService<SqliteEventRepository<'_>, MultiGeocoder, C>,
    command: Commands,
) -> Result<(), Box<dyn Error>> {
    let events = match command {
        Commands::Add {
            title,
            location,
            at,
            in_days,
            description,
            recurring,
        } => {
            let date = start_at(service.clock().now_epoch_ms(), at, in_days)?;
            let recurrence = if recurring {
                Recurrence::Recurring
            } else {
                Recurrence::Special
            };

            let mut event = Event::new(title, date, location).with_recurrence(recurrence);
            event.description = description;
            let report = service.save(&mut event)?;
            println!("{}\tgeocode={}", report.id, report.geocode.as_str());
            return Ok(());
        }
        Commands::Show { id } => {
            let event = service.get(id)?.ok_or_else(|| format!("event not found: {id}"))?;
            println!("{}", serde_json::to_string_pretty(&event)?);
            return Ok(());
        }
        Commands::Delete { id } => {
            service.delete(id)?;
            println!("deleted {id}");
            return Ok(());
        }
        Commands::Future => service.future()?,
        Commands::Past => service.past()?,
        Commands::Next { limit } => service.next(limit)?,
        Commands::Recurring => service.recurring()?,
        Commands::Special => service.special()?,
        Commands::NextFiveSpecial => service.next_five_special()?,
        Commands::NextFourRecurring => service.next_four_recurring()?,
    };

    for event in &events {
        println!("{}", format_row(event));
    }
    Ok(())
}

/// Resolves `--at` / `--in-days` into an epoch-millisecond start.
fn start_at(now: i64, at: Option<i64>, in_days: Option<i64>) -> Result<i64, String> {
    if let Some(at) = at {
        return Ok(at);
    }
    let days = in_days.unwrap_or(0);
    days.checked_mul(DAY_MS)
        .and_then(|offset| now.checked_add(offset))
        .ok_or_else(|| format!("--in-days {days} is out of range"))
}

fn format_row(event: &Event) -> String {
    let coordinates = event
        .lat_lng_pair()
        .map_or_else(|| "-".to_string(), |[lat, lng]| format!("{lat},{lng}"));
    format!(
        "{}\t{}\t{}\t{}\t{}\t{}",
        event.id,
        event.date.unwrap_or_default(),
        event.recurrence,
        event.title,
        event.location,
        coordinates
    )
}
