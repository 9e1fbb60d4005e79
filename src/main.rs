//! Idle Research Planner
//!
//! Plans the purchase order of research tiers in an idle management game so
//! that income grows as fast as possible.

mod catalog;
mod db;
mod import;
mod models;
mod planner;
mod pricing;
mod units;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::catalog::Catalog;
use crate::db::SqliteStore;
use crate::models::GameState;
use crate::pricing::{KnownCostStore, PriceResolver, StoreResolver, MAX_DISCOUNT};
use crate::units::{format_amount, parse_amount};

#[derive(Parser)]
#[command(name = "research-planner")]
#[command(about = "Purchase-order planner for idle game researches")]
struct Cli {
    /// Path to the SQLite database
    #[arg(short, long, global = true, env = "RESEARCH_PLANNER_DB", default_value = "research.db")]
    database: PathBuf,

    /// Log planner decisions (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize empty database with schema
    Init,

    /// Load sample data for testing
    LoadSample,

    /// Import research definitions from a JSON file or directory
    Import {
        /// File or directory to scan for *.json files
        path: PathBuf,
    },

    /// List all researches in the database
    List,

    /// Plan the purchase order for the current game state
    Plan {
        /// Current income per second (e.g. "1.5M")
        #[arg(short, long, value_parser = parse_amount)]
        rate: f64,

        /// Current balance (e.g. "12.5B")
        #[arg(short, long, value_parser = parse_amount, default_value = "0")]
        balance: f64,

        /// Number of plan rows to show
        #[arg(short, long, default_value_t = 10)]
        limit: usize,

        /// Show every plan row
        #[arg(long)]
        all: bool,

        /// Current discount percentage prices are wanted at
        #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u32).range(0..=i64::from(MAX_DISCOUNT)))]
        discount: u32,

        /// Per-tier price growth assumed when only one price of a research is known
        #[arg(long)]
        fallback_growth: Option<f64>,
    },

    /// List next tiers without a confirmed price, with a suggested guess
    Pending {
        /// Current discount percentage prices are wanted at
        #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u32).range(0..=i64::from(MAX_DISCOUNT)))]
        discount: u32,

        /// Per-tier price growth assumed when only one price of a research is known
        #[arg(long)]
        fallback_growth: Option<f64>,
    },

    /// Record the confirmed price of a tier
    SetPrice {
        /// Research ID
        research: String,
        /// Tier index, starting at 0
        tier: u32,
        /// Price (e.g. "250B")
        #[arg(value_parser = parse_amount)]
        price: f64,
        /// Discount percentage the price was seen at
        #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u32).range(0..=i64::from(MAX_DISCOUNT)))]
        discount: u32,
    },

    /// Forget the recorded prices of a tier
    ClearPrice {
        /// Research ID
        research: String,
        /// Tier index, starting at 0
        tier: u32,
        /// Only forget the price seen at this discount percentage
        #[arg(long)]
        discount: Option<u32>,
    },

    /// Set how many tiers of a research are owned
    Own {
        /// Research ID
        research: String,
        /// Number of owned tiers
        count: u32,
    },

    /// Mark the next tier of a research as bought
    Buy {
        /// Research ID
        research: String,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let conn = Connection::open(&cli.database)
        .with_context(|| format!("Failed to open {}", cli.database.display()))?;
    db::init_schema(&conn)?;

    match cli.command {
        Commands::Init => {
            println!("Database initialized at: {}", cli.database.display());
        }

        Commands::LoadSample => {
            load_sample_data(&conn)?;
            println!("Sample data loaded successfully!");
        }

        Commands::Import { path } => {
            let stats = import::import_to_database(&conn, &path)?;
            println!("{}", stats);
        }

        Commands::List => {
            let researches = db::list_researches(&conn)?;
            if researches.is_empty() {
                println!("No researches in database. Run 'import' or 'load-sample' first.");
            } else {
                println!(
                    "{:<20} {:<28} {:>7} {:>7}",
                    "ID", "Research", "Owned", "Prices"
                );
                println!("{}", "-".repeat(65));
                for r in researches {
                    println!(
                        "{:<20} {:<28} {:>7} {:>7}",
                        r.id,
                        r.name,
                        format!("{}/{}", r.owned, r.tiers),
                        format!("{}/{}", r.known_costs, r.tiers)
                    );
                }
            }
        }

        Commands::Plan {
            rate,
            balance,
            limit,
            all,
            discount,
            fallback_growth,
        } => {
            let catalog = Catalog::build(db::load_researches(&conn, discount)?);
            let store = SqliteStore::new(&conn);
            let resolver = StoreResolver::new(&store)
                .at_discount(discount)
                .with_fallback_growth(fallback_growth);

            info!(
                researches = catalog.researches().len(),
                unowned = catalog.unowned_count(),
                rate,
                balance,
                discount,
                "planning"
            );
            let plan = planner::plan(&catalog, GameState::new(rate, balance), &resolver)?;

            print!("{}", planner::format_plan(&plan, (!all).then_some(limit)));
            println!();
            print!("{}", planner::summarize_plan(&plan));
        }

        Commands::Pending {
            discount,
            fallback_growth,
        } => {
            let catalog = Catalog::build(db::load_researches(&conn, discount)?);
            let store = SqliteStore::new(&conn);
            let resolver = StoreResolver::new(&store)
                .at_discount(discount)
                .with_fallback_growth(fallback_growth);

            let pending: Vec<_> = catalog
                .frontier(&catalog.progress())
                .into_iter()
                .filter(|c| c.tier.cost.is_none())
                .collect();
            if pending.is_empty() {
                println!("All next tiers have confirmed prices.");
            }
            for candidate in pending {
                let tier = candidate.tier_ref();
                let guess = match resolver.price_of(&tier) {
                    Ok(quote) => format_amount(quote.cost),
                    Err(_) => "?".to_string(),
                };
                println!(
                    "{:<28} tier {:>3}  guess {:>14}   set-price {} {} <price> --discount {}",
                    candidate.research.name, tier.tier, guess, tier.research_id, tier.tier, discount
                );
            }
        }

        Commands::SetPrice {
            research,
            tier,
            price,
            discount,
        } => {
            let known = db::list_researches(&conn)?
                .into_iter()
                .find(|r| r.id == research)
                .with_context(|| format!("unknown research '{}'", research))?;
            if tier >= known.tiers {
                anyhow::bail!("research '{}' has only {} tiers", research, known.tiers);
            }
            let mut store = SqliteStore::new(&conn);
            store.set_known_cost(&research, tier, discount, price)?;
            println!(
                "{} tier {} costs {} at {}% discount",
                research,
                tier,
                format_amount(price),
                discount
            );
        }

        Commands::ClearPrice {
            research,
            tier,
            discount,
        } => {
            match db::clear_known_cost(&conn, &research, tier, discount)? {
                0 => println!("No price recorded for {} tier {}", research, tier),
                n => println!("Forgot {} price(s) of {} tier {}", n, research, tier),
            }
        }

        Commands::Own { research, count } => {
            db::set_owned_tiers(&conn, &research, count)?;
            println!("{} now owns {} tiers", research, count);
        }

        Commands::Buy { research } => {
            let tier = db::buy_next_tier(&conn, &research)?;
            println!("Bought {} tier {}", research, tier);
            let has_next = db::list_researches(&conn)?
                .iter()
                .any(|r| r.id == research && r.owned < r.tiers);
            let next_priced = db::known_costs(&conn, &research)?
                .iter()
                .any(|k| k.tier == tier + 1);
            if has_next && !next_priced {
                println!("Next tier has no confirmed price yet; see 'pending'.");
            }
        }
    }

    Ok(())
}

/// Load a small sample catalog for trying the planner
fn load_sample_data(conn: &Connection) -> Result<()> {
    use crate::models::Research;

    db::clear_data(conn)?;

    let samples = [
        Research::new("fuel", "Fuel Efficiency")
            .with_tier(Some(50_000.0), 120.0, true)
            .with_tier(Some(400_000.0), 600.0, false)
            .with_tier(Some(3_200_000.0), 2_500.0, false)
            .with_tier(None, 9_000.0, false),
        Research::new("checkin", "Check-in Speed")
            .with_tier(Some(25_000.0), 80.0, false)
            .with_tier(Some(150_000.0), 300.0, false)
            .with_tier(None, 1_100.0, false),
        Research::new("baggage", "Baggage Handling")
            .with_tier(Some(1_000_000.0), 1_500.0, false)
            .with_tier(Some(12_000_000.0), 11_000.0, false),
        Research::new("gates", "Gate Expansion")
            .with_tier(Some(250_000.0), 400.0, false)
            .with_tier(None, 1_800.0, false)
            .with_tier(None, 7_000.0, false),
    ];

    for research in &samples {
        db::save_research(conn, research, 0)?;
    }

    println!("Loaded {} sample researches", samples.len());
    Ok(())
}
