use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{ArgAction, Args, Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use material_reservations::{
    config::{self, AppConfig},
    db,
    events::{process_events, EventHandler, EventSender, LoggingEventHandler},
    metrics,
    quantity::Quantity,
    services::{
        movements::{AdjustmentCommand, BatchRef, EntranceCommand, ExitCommand},
        transfers::TransferRequest,
        EngineContext, ServiceContainer, ServiceFactory,
    },
    store::{DynStore, SeaOrmStore},
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::load_config().context("failed to load application config")?;
    config::init_tracing(config.log_level(), config.log_json);

    let db_pool = db::establish_connection_from_app_config(&config)
        .await
        .context("failed to connect to database")?;
    db::check_connection(&db_pool)
        .await
        .context("database did not answer ping")?;
    if config.auto_migrate || matches!(cli.command, Commands::Migrate) {
        db::run_migrations(&db_pool)
            .await
            .context("failed running migrations")?;
    }
    if matches!(cli.command, Commands::Migrate) {
        println!("Migrations applied");
        return Ok(());
    }

    let services = build_services(&config, Arc::new(db_pool));
    let json = cli.json;

    match cli.command {
        Commands::Migrate => {}
        Commands::Reserve(args) => {
            let outcome = services
                .reservations
                .reserve(args.production_order_id)
                .await
                .context("reservation failed")?;
            if json {
                print_json(&outcome)?;
            } else {
                println!(
                    "Order {} is {}: {} material(s) reserved in this pass, {} complete",
                    outcome.order.id,
                    outcome.status,
                    outcome.reserved_items,
                    outcome.completed_items
                );
            }
        }
        Commands::Unreserve(args) => {
            let outcome = services
                .reservations
                .unreserve(args.production_order_id)
                .await
                .context("release failed")?;
            if json {
                print_json(&outcome)?;
            } else {
                println!(
                    "Released {} reservation(s) of order {}",
                    outcome.released_entries, outcome.order.id
                );
            }
        }
        Commands::Shortages(args) => {
            let shortages = services
                .reservations
                .shortages(args.production_order_id)
                .await
                .context("failed to compute shortages")?;
            if json {
                print_json(&shortages)?;
            } else {
                for shortage in shortages {
                    println!(
                        "- {} • required {} • reserved {} • outstanding {} • free {}",
                        shortage.name,
                        shortage.required,
                        shortage.reserved,
                        shortage.outstanding,
                        shortage.free_in_warehouse
                    );
                }
            }
        }
        Commands::Transfer(args) => {
            let outcome = services
                .transfers
                .transfer(TransferRequest {
                    quantity: args.quantity,
                    product_id: args.product_id,
                    stock_out: args.stock_out,
                    stock_in: args.stock_in,
                    warehouse_out: args.warehouse_out,
                    warehouse_in: args.warehouse_in,
                    batch_id: args.batch_id,
                })
                .await
                .context("transfer failed")?;
            if json {
                print_json(&outcome)?;
            } else {
                println!(
                    "Moved {} to availability {} ({} reservation(s) carried)",
                    args.quantity, outcome.destination.id, outcome.moved_reservations
                );
            }
        }
        Commands::Entrance(args) => {
            let availability = services
                .movements
                .entrance(EntranceCommand {
                    product_id: args.location.product_id,
                    stock_id: args.location.stock_id,
                    warehouse_id: args.location.warehouse_id,
                    quantity: args.quantity,
                    price: args.price,
                    batch: args.location.batch(),
                })
                .await
                .context("entrance failed")?;
            if json {
                print_json(&availability)?;
            } else {
                println!(
                    "Availability {} now holds {}",
                    availability.id, availability.quantity
                );
            }
        }
        Commands::Exit(args) => {
            let remaining = services
                .movements
                .exit(ExitCommand {
                    product_id: args.location.product_id,
                    stock_id: args.location.stock_id,
                    warehouse_id: args.location.warehouse_id,
                    quantity: args.quantity,
                    batch: args.location.batch(),
                })
                .await
                .context("exit failed")?;
            if json {
                print_json(&remaining)?;
            } else {
                match remaining {
                    Some(availability) => println!(
                        "Availability {} now holds {}",
                        availability.id, availability.quantity
                    ),
                    None => println!("Availability depleted and removed"),
                }
            }
        }
        Commands::Adjust(args) => {
            let result = services
                .movements
                .adjust(AdjustmentCommand {
                    product_id: args.location.product_id,
                    stock_id: args.location.stock_id,
                    warehouse_id: args.location.warehouse_id,
                    quantity: args.quantity,
                    price: args.price,
                    batch: args.location.batch(),
                })
                .await
                .context("adjustment failed")?;
            if json {
                print_json(&result)?;
            } else {
                match result {
                    Some(availability) => println!(
                        "Availability {} now holds {}",
                        availability.id, availability.quantity
                    ),
                    None => println!("Availability depleted and removed"),
                }
            }
        }
        Commands::Summary(args) => {
            let summary = services
                .movements
                .stock_summary(args.product_id, args.warehouse_id)
                .await
                .context("failed to summarize stock")?;
            if json {
                print_json(&summary)?;
            } else {
                println!(
                    "On hand {} • reserved {} • free {}",
                    summary.quantity, summary.reserved, summary.free
                );
                for line in summary.lines {
                    println!(
                        "- stock {} • batch {} • {} ({} reserved)",
                        line.location.stock_id,
                        line.location
                            .batch_id
                            .map(|id| id.to_string())
                            .unwrap_or_else(|| "-".to_string()),
                        line.quantity,
                        line.reserved
                    );
                }
            }
        }
        Commands::Metrics => {
            print!("{}", metrics::gather_text().context("failed to gather metrics")?);
        }
    }

    Ok(())
}

fn build_services(config: &AppConfig, db: Arc<db::DbPool>) -> ServiceContainer {
    let store: DynStore = Arc::new(SeaOrmStore::new(db));
    let (event_sender, event_rx) = EventSender::channel(config.event_channel_capacity);
    let handlers: Vec<Arc<dyn EventHandler>> = vec![Arc::new(LoggingEventHandler)];
    tokio::spawn(process_events(event_rx, handlers));

    let ctx = EngineContext::new(store, event_sender).with_config(config.engine.clone());
    info!(environment = %config.environment, "Engine ready");
    ServiceContainer::new(&ServiceFactory::new(ctx))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Parser)]
#[command(
    name = "material-reservations",
    about = "Reserve production-order materials against warehouse stock",
    version
)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Reserve a production order's outstanding materials
    Reserve(OrderArgs),
    /// Release every reservation held by a production order
    Unreserve(OrderArgs),
    /// Show what a production order still lacks
    Shortages(OrderArgs),
    /// Move stock between two locations, carrying reservations
    Transfer(TransferArgs),
    /// Receive stock into a location
    Entrance(EntranceArgs),
    /// Remove stock from a location
    Exit(ExitArgs),
    /// Apply a signed stock correction
    Adjust(AdjustArgs),
    /// On-hand, reserved and free totals of a product in a warehouse
    Summary(SummaryArgs),
    /// Print engine metrics in Prometheus text format
    Metrics,
}

#[derive(Args)]
struct OrderArgs {
    #[arg(value_parser = clap::value_parser!(Uuid), help = "Production order identifier")]
    production_order_id: Uuid,
}

#[derive(Args)]
struct TransferArgs {
    #[arg(long, value_parser = clap::value_parser!(Uuid), help = "Product identifier")]
    product_id: Uuid,
    #[arg(long, help = "Quantity to move, in the product's own unit")]
    quantity: Quantity,
    #[arg(long, value_parser = clap::value_parser!(Uuid), help = "Source stock")]
    stock_out: Uuid,
    #[arg(long, value_parser = clap::value_parser!(Uuid), help = "Source warehouse")]
    warehouse_out: Uuid,
    #[arg(long, value_parser = clap::value_parser!(Uuid), help = "Destination stock")]
    stock_in: Uuid,
    #[arg(long, value_parser = clap::value_parser!(Uuid), help = "Destination warehouse")]
    warehouse_in: Uuid,
    #[arg(long, value_parser = clap::value_parser!(Uuid), help = "Batch identifier")]
    batch_id: Option<Uuid>,
}

#[derive(Args)]
struct LocationArgs {
    #[arg(long, value_parser = clap::value_parser!(Uuid), help = "Product identifier")]
    product_id: Uuid,
    #[arg(long, value_parser = clap::value_parser!(Uuid), help = "Stock identifier")]
    stock_id: Uuid,
    #[arg(long, value_parser = clap::value_parser!(Uuid), help = "Warehouse identifier")]
    warehouse_id: Uuid,
    #[arg(long, help = "Batch name")]
    batch: Option<String>,
    #[arg(long, help = "Expiration day of a new batch (YYYY-MM-DD)")]
    expiration_day: Option<NaiveDate>,
}

impl LocationArgs {
    fn batch(&self) -> Option<BatchRef> {
        self.batch.clone().map(|name| BatchRef {
            name,
            expiration_day: self.expiration_day,
        })
    }
}

#[derive(Args)]
struct EntranceArgs {
    #[command(flatten)]
    location: LocationArgs,
    #[arg(long, help = "Quantity received")]
    quantity: Quantity,
    #[arg(long, help = "Unit price of the received stock")]
    price: Option<Decimal>,
}

#[derive(Args)]
struct ExitArgs {
    #[command(flatten)]
    location: LocationArgs,
    #[arg(long, help = "Quantity removed")]
    quantity: Quantity,
}

#[derive(Args)]
struct AdjustArgs {
    #[command(flatten)]
    location: LocationArgs,
    #[arg(long, allow_hyphen_values = true, help = "Signed quantity")]
    quantity: Quantity,
    #[arg(long, help = "Unit price when stock is added")]
    price: Option<Decimal>,
}

#[derive(Args)]
struct SummaryArgs {
    #[arg(long, value_parser = clap::value_parser!(Uuid), help = "Product identifier")]
    product_id: Uuid,
    #[arg(long, value_parser = clap::value_parser!(Uuid), help = "Warehouse identifier")]
    warehouse_id: Uuid,
}
