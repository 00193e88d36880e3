use chrono::{Local, NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand, ValueEnum};
use dosewise_core::calendar;
use dosewise_core::reminders::reminders_on;
use dosewise_core::*;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "dosewise")]
#[command(about = "Medication reminder schedules and adherence tracking", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show today's dose progress for every medication (default)
    Today {
        /// Day to report on instead of today (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date_arg)]
        date: Option<NaiveDate>,
    },

    /// List expected reminder times over a date range
    Schedule {
        /// First day (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date_arg)]
        from: NaiveDate,

        /// Last day, inclusive (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date_arg)]
        to: NaiveDate,

        /// Only this medication id
        #[arg(long)]
        medication: Option<String>,
    },

    /// Create pending reminders ahead of time
    Materialize {
        /// Number of days to cover, starting at --date (defaults to config)
        #[arg(long)]
        days: Option<u32>,

        /// First day to cover instead of today (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date_arg)]
        date: Option<NaiveDate>,
    },

    /// Mark the next pending dose of a medication as taken
    Take {
        /// Medication id
        medication: String,

        /// Acknowledgment time instead of now (YYYY-MM-DDTHH:MM[:SS])
        #[arg(long, value_parser = parse_datetime_arg)]
        at: Option<NaiveDateTime>,
    },

    /// Show taken doses per day of the week or per month of the year
    Chart {
        /// Chart range
        #[arg(value_enum)]
        range: ChartRange,

        /// Only this medication id
        #[arg(long)]
        medication: Option<String>,

        /// Day that selects the week/year instead of today (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date_arg)]
        date: Option<NaiveDate>,
    },

    /// Export the reminder history to CSV
    Export {
        /// Output file
        path: PathBuf,
    },

    /// Drop superseded rows from the reminder log
    Compact,
}

#[derive(Clone, Copy, ValueEnum)]
enum ChartRange {
    Week,
    Year,
}

fn parse_date_arg(s: &str) -> std::result::Result<NaiveDate, String> {
    calendar::parse_date(s).map_err(|e| e.to_string())
}

fn parse_datetime_arg(s: &str) -> std::result::Result<NaiveDateTime, String> {
    calendar::parse_datetime(s).map_err(|e| e.to_string())
}

/// Files the CLI reads and writes inside the data directory
struct DataPaths {
    registry: PathBuf,
    reminders: PathBuf,
}

impl DataPaths {
    fn new(data_dir: &Path) -> Self {
        Self {
            registry: data_dir.join("medications.toml"),
            reminders: data_dir.join("reminders.jsonl"),
        }
    }
}

fn main() -> Result<()> {
    // Initialize logging
    dosewise_core::logging::init();

    let cli = Cli::parse();

    // Determine data directory
    let config = Config::load()?;
    let data_dir = cli.data_dir.unwrap_or_else(|| config.data.data_dir.clone());
    let paths = DataPaths::new(&data_dir);

    let today = Local::now().date_naive();

    match cli.command {
        Some(Commands::Today { date }) => cmd_today(&paths, date.unwrap_or(today)),
        Some(Commands::Schedule {
            from,
            to,
            medication,
        }) => cmd_schedule(&paths, from, to, medication.as_deref()),
        Some(Commands::Materialize { days, date }) => cmd_materialize(
            &paths,
            date.unwrap_or(today),
            days.unwrap_or(config.reminders.lookahead_days),
        ),
        Some(Commands::Take { medication, at }) => cmd_take(
            &paths,
            &medication,
            at.unwrap_or_else(|| Local::now().naive_local()),
        ),
        Some(Commands::Chart {
            range,
            medication,
            date,
        }) => cmd_chart(
            &paths,
            &config,
            range,
            medication.as_deref(),
            date.unwrap_or(today),
        ),
        Some(Commands::Export { path }) => cmd_export(&paths, &path),
        Some(Commands::Compact) => cmd_compact(&paths),
        None => {
            // Default to "today" command
            cmd_today(&paths, today)
        }
    }
}

fn cmd_today(paths: &DataPaths, day: NaiveDate) -> Result<()> {
    let registry = Registry::load(&paths.registry)?;
    let reminders = ReminderLog::new(&paths.reminders).read_all()?;

    println!("\nDoses for {} ({})", day, calendar::weekday_label(day));
    println!("─────────────────────────────────────────");

    let mut shown = 0;
    for (medication, schedule) in registry.scheduled(None) {
        let expected = match generate_day(medication, schedule, day) {
            Ok(expected) => expected,
            Err(e) => {
                eprintln!("  {}: {}", medication.name, e);
                continue;
            }
        };
        shown += 1;

        let own: Vec<_> = reminders
            .iter()
            .filter(|r| r.medication_id == medication.id)
            .cloned()
            .collect();
        let progress = daily_progress(day, &expected, &own);

        let marker = if progress.is_complete() { "✓" } else { " " };
        println!("{} {:<24} {}", marker, medication.name, progress);

        let taken_slots: Vec<NaiveDateTime> = reminders_on(&own, &medication.id, day)
            .filter(|r| r.is_taken)
            .map(|r| r.scheduled_at)
            .collect();
        let times: Vec<String> = expected
            .iter()
            .map(|instant| {
                let check = if taken_slots.contains(instant) { "✓" } else { "·" };
                format!("{} {}", check, instant.format("%H:%M"))
            })
            .collect();
        if !times.is_empty() {
            println!("    {}", times.join("  "));
        }
    }

    if shown == 0 {
        println!("  No scheduled medications.");
    }
    println!();

    Ok(())
}

fn cmd_schedule(
    paths: &DataPaths,
    from: NaiveDate,
    to: NaiveDate,
    only: Option<&str>,
) -> Result<()> {
    let registry = Registry::load(&paths.registry)?;
    if let Some(id) = only {
        registry.find(id)?;
    }

    for (medication, schedule) in registry.scheduled(only) {
        let expected = generate(medication, schedule, from, to)?;

        println!("{} [{}]", medication.name, schedule.kind_name());
        if let Some(days) = expander::active_weekdays(schedule) {
            let names: Vec<_> = days.iter().map(|d| d.to_string()).collect();
            println!("  on {}", names.join(", "));
        }

        if expected.is_empty() {
            println!("  (not active in this period)");
        }

        for (day, instants) in &expected {
            let times: Vec<String> = instants
                .iter()
                .map(|i| i.format("%H:%M").to_string())
                .collect();
            let shown = if times.is_empty() {
                "-".to_string()
            } else {
                times.join(" ")
            };
            println!("  {} {}  {}", day, calendar::weekday_label(*day), shown);
        }
    }

    Ok(())
}

fn cmd_materialize(paths: &DataPaths, from: NaiveDate, days: u32) -> Result<()> {
    if days == 0 {
        return Err(Error::Config("--days must be at least 1".into()));
    }

    let registry = Registry::load(&paths.registry)?;
    let mut log = ReminderLog::new(&paths.reminders);

    let to = from + chrono::Duration::days(i64::from(days) - 1);
    let count = log.update(|existing| {
        let mut created = Vec::new();
        for (medication, schedule) in registry.scheduled(None) {
            created.extend(materialize(medication, schedule, from, to, existing)?);
        }
        let count = created.len();
        Ok((created, count))
    })?;

    println!(
        "✓ Created {} reminders for {} to {}",
        count,
        from,
        to
    );
    Ok(())
}

fn cmd_take(paths: &DataPaths, medication_id: &str, now: NaiveDateTime) -> Result<()> {
    let registry = Registry::load(&paths.registry)?;
    let entry = registry.find(medication_id)?;
    let schedule = entry
        .schedule
        .as_ref()
        .ok_or_else(|| Error::NotFound(format!("{} has no active schedule", medication_id)))?;

    let mut log = ReminderLog::new(&paths.reminders);
    let day = now.date();

    // Today's reminders are materialized on the way if materialize never ran
    let taken = log.update(|existing| take_dose(&entry.medication, schedule, existing, now))?;

    match taken {
        Some(_) => {
            let own: Vec<_> = log
                .read_all()?
                .into_iter()
                .filter(|r| r.medication_id == medication_id)
                .collect();
            let expected = generate_day(&entry.medication, schedule, day)?;
            let progress = daily_progress(day, &expected, &own);

            println!("✓ {} taken at {}", entry.medication.name, now.format("%H:%M"));
            println!("  Today: {}", progress);
        }
        None => {
            println!("No pending dose of {} on {}.", entry.medication.name, day);
        }
    }

    Ok(())
}

fn cmd_chart(
    paths: &DataPaths,
    config: &Config,
    range: ChartRange,
    only: Option<&str>,
    day: NaiveDate,
) -> Result<()> {
    let registry = Registry::load(&paths.registry)?;
    if let Some(id) = only {
        registry.find(id)?;
    }
    let reminders = ReminderLog::new(&paths.reminders).read_all()?;

    let (bucketing, (start, end), title) = match range {
        ChartRange::Week => {
            let (monday, sunday) = calendar::week_containing(day);
            (Bucketing::ByDay, (monday, sunday), format!("Week of {}", monday))
        }
        ChartRange::Year => (
            Bucketing::ByMonth,
            calendar::year_containing(day),
            format!("Year {}", day.format("%Y")),
        ),
    };

    // Merge every included medication into one expected map. Each
    // medication's acknowledgments only count on its own scheduled days.
    let mut expected = ExpectedDoses::new();
    let mut actual = Vec::new();
    for (medication, schedule) in registry.scheduled(only) {
        let own = generate(medication, schedule, start, end)?;
        actual.extend(
            reminders
                .iter()
                .filter(|r| r.medication_id == medication.id)
                .filter(|r| match r.taken_at {
                    Some(at) => own.contains_key(&at.date()),
                    None => true,
                })
                .cloned(),
        );
        for (date, instants) in own {
            expected.entry(date).or_default().extend(instants);
        }
    }

    let current = bucketing.key_for(day);
    let summary = aggregate_with_floor(
        &expected,
        &actual,
        bucketing,
        |key| *key == current,
        config.chart.axis_floor(bucketing),
    );

    println!("\n{} (scale 0-{})", title, summary.max_scheduled);
    println!("─────────────────────────────────────────");
    if summary.buckets.is_empty() {
        println!("  No doses scheduled in this period.");
    }

    let width = 20usize;
    for bucket in &summary.buckets {
        let filled = (bucket.taken * width)
            .checked_div(summary.max_scheduled)
            .unwrap_or(0)
            .min(width);
        let marker = if bucket.highlighted { ">" } else { " " };
        println!(
            "{} {:<4} {:<width$} {}",
            marker,
            bucket.label,
            "█".repeat(filled),
            bucket.taken,
            width = width
        );
    }
    println!();

    Ok(())
}

fn cmd_export(paths: &DataPaths, out: &Path) -> Result<()> {
    let reminders = ReminderLog::new(&paths.reminders).read_all()?;

    if reminders.is_empty() {
        println!("No reminders recorded - nothing to export.");
        return Ok(());
    }

    let count = export_history_csv(&reminders, out)?;
    println!("✓ Exported {} reminders", count);
    println!("  CSV: {}", out.display());
    Ok(())
}

fn cmd_compact(paths: &DataPaths) -> Result<()> {
    let stats = ReminderLog::new(&paths.reminders).compact()?;
    println!(
        "✓ Compacted reminder log: {} lines kept, {} superseded rows dropped",
        stats.kept, stats.dropped
    );
    Ok(())
}
