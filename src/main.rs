use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;

mod aggregate;
mod db;
mod discovery;
mod export;
mod feed;
mod keys;
mod logs;
mod models;
mod store;
mod window;

use aggregate::AggregatedSeries;
use feed::HouseSelector;
use models::Granularity;
use window::TimeWindow;

#[derive(Parser)]
#[command(name = "henhouse-telemetry")]
#[command(about = "Egg production telemetry reader for poultry houses", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic sample readings and device logs
    Seed,
    /// List known houses
    Houses,
    /// List the sensors reporting for one house
    Sensors {
        #[arg(long)]
        house: String,
    },
    /// Show the latest per-sensor snapshot for one house
    Latest {
        #[arg(long)]
        house: String,
    },
    /// Aggregate one window and write it as CSV
    Export {
        /// Omitted: read the designated default house
        #[arg(long)]
        house: Option<String>,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
        #[arg(long, default_value = "00:00")]
        start_hour: String,
        #[arg(long, default_value = "24:00")]
        end_hour: String,
        #[arg(long, default_value_t = Granularity::Hour)]
        granularity: Granularity,
        #[arg(long, default_value = "production.csv")]
        out: PathBuf,
    },
    /// Follow a live aggregated feed until Ctrl-C
    Watch {
        #[arg(long)]
        house: Option<String>,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
        #[arg(long, default_value = "00:00")]
        start_hour: String,
        #[arg(long, default_value = "24:00")]
        end_hour: String,
        #[arg(long, default_value_t = Granularity::Minute)]
        granularity: Granularity,
    },
    /// Show recent device log lines, newest first
    Logs {
        #[arg(long)]
        house: Option<String>,
        #[arg(long, default_value_t = 100)]
        limit: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to the telemetry Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Houses => {
            let store = db::PgStore::new(pool);
            let houses = discovery::list_houses(&store).await;
            if houses.is_empty() {
                println!("No houses found.");
            }
            for house in houses {
                println!("{house}");
            }
        }
        Commands::Sensors { house } => {
            let store = db::PgStore::new(pool);
            let sensors = discovery::list_sensors(&store, &house).await;
            if sensors.is_empty() {
                println!("No sensors found for {house}.");
            }
            for sensor in sensors {
                println!("{sensor}");
            }
        }
        Commands::Latest { house } => {
            let store = db::PgStore::new(pool);
            match discovery::latest_reading(&store, &house).await {
                Some(reading) => {
                    println!(
                        "{} at {}",
                        reading.house,
                        reading.timestamp.format("%d-%m-%Y %H:%M")
                    );
                    for (sensor, count) in &reading.sensors {
                        println!("  {sensor}: {count}");
                    }
                    println!("  total: {}", reading.total());
                }
                None => println!("No readings for {house}."),
            }
        }
        Commands::Export {
            house,
            from,
            to,
            start_hour,
            end_hour,
            granularity,
            out,
        } => {
            let window = build_window(from, to, &start_hour, &end_hour)?;
            let store = db::PgStore::new(pool);
            let update =
                feed::fetch_aggregated(&store, &selector_for(house), &window, granularity).await;
            if let Some(message) = update.message {
                eprintln!("warning: {message}");
            }
            let file = std::fs::File::create(&out)
                .with_context(|| format!("failed to create {}", out.display()))?;
            match &update.series {
                AggregatedSeries::Minute(series) => export::write_minute_csv(file, series)?,
                AggregatedSeries::Hour(series) => export::write_hour_csv(file, series)?,
                AggregatedSeries::Sensor(table) => export::write_sensor_csv(file, table)?,
            }
            println!(
                "Exported {} {} buckets to {}.",
                update.series.bucket_count(),
                granularity,
                out.display()
            );
        }
        Commands::Watch {
            house,
            from,
            to,
            start_hour,
            end_hour,
            granularity,
        } => {
            let window = build_window(from, to, &start_hour, &end_hour)?;
            let store: Arc<dyn store::TelemetryStore> = Arc::new(db::PgStore::new(pool));
            let subscription = feed::subscribe_aggregated(
                store,
                selector_for(house),
                window,
                granularity,
                |update| {
                    let stamp = Utc::now().format("%H:%M:%S");
                    match update.message {
                        Some(message) => println!("[{stamp}] {message}"),
                        None => println!(
                            "[{stamp}] {} buckets, {} eggs",
                            update.series.bucket_count(),
                            update.series.total_eggs()
                        ),
                    }
                },
            );
            tokio::signal::ctrl_c()
                .await
                .context("failed to wait for Ctrl-C")?;
            subscription.unsubscribe();
            println!("Feed closed.");
        }
        Commands::Logs { house, limit } => {
            let store = db::PgStore::new(pool);
            let entries = logs::recent_logs(&store, house.as_deref(), limit).await;
            if entries.is_empty() {
                println!("No logs to show.");
            }
            for entry in &entries {
                println!("{}", logs::format_entry(entry));
            }
        }
    }

    Ok(())
}

fn selector_for(house: Option<String>) -> HouseSelector {
    match house {
        Some(name) => HouseSelector::House(name),
        None => HouseSelector::All,
    }
}

fn build_window(
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    start_hour: &str,
    end_hour: &str,
) -> anyhow::Result<TimeWindow> {
    let today = Utc::now().date_naive();
    let from = from.unwrap_or(today);
    let to = to.unwrap_or(from);
    Ok(TimeWindow::new(from, to, start_hour, end_hour)?)
}
