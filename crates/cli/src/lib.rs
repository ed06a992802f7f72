pub mod commands;

use clap::{Args, Parser, Subcommand};
use std::process::ExitCode;
use temtudo_core::domain::market::GeoPoint;

use crate::commands::optimize::{parse_item_spec, ItemSpec};

#[derive(Debug, Parser)]
#[command(
    name = "temtudo",
    about = "Temtudo grocery price comparison CLI",
    long_about = "Manage the price catalog database and query market rankings, cart optimizations, and price tiers.",
    after_help = "Examples:\n  temtudo migrate\n  temtudo rank --name arroz --lat -22.97 --lng -43.18\n  temtudo optimize --item 1:2 --item 4:6\n  temtudo doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct LocationArgs {
    #[arg(long, requires = "lng", allow_hyphen_values = true, help = "User latitude in degrees")]
    lat: Option<f64>,
    #[arg(long, requires = "lat", allow_hyphen_values = true, help = "User longitude in degrees")]
    lng: Option<f64>,
}

impl LocationArgs {
    fn point(&self) -> Option<GeoPoint> {
        self.lat.zip(self.lng).map(|(lat, lng)| GeoPoint::new(lat, lng))
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the deterministic demo catalog and verify its row counts")]
    Seed,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Validate config, DB connectivity, and catalog schema")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Rank markets by their lowest price for a product")]
    Rank {
        #[arg(long, help = "Product id to rank")]
        product_id: Option<i64>,
        #[arg(long, help = "Case-insensitive product name or brand fragment")]
        name: Option<String>,
        #[command(flatten)]
        location: LocationArgs,
    },
    #[command(about = "Find the markets that best cover a shopping cart")]
    Optimize {
        #[arg(
            long = "item",
            required = true,
            value_parser = parse_item_spec,
            help = "Cart item as PRODUCT_ID or PRODUCT_ID:QUANTITY (repeatable)"
        )]
        items: Vec<ItemSpec>,
        #[command(flatten)]
        location: LocationArgs,
    },
    #[command(about = "Classify located markets as cheap, medium, or expensive")]
    Tiers,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Rank { product_id, name, location } => {
            commands::rank::run(product_id, name.as_deref(), location.point())
        }
        Command::Optimize { items, location } => commands::optimize::run(&items, location.point()),
        Command::Tiers => commands::tiers::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
