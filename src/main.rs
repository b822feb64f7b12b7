use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use givit_map_cache::{Category, MapDataRuntime};

#[derive(Parser)]
#[command(name = "givit-map", version, about = "Inspect the Givit map data layer")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load one category and print its normalised listings as JSON
    Listings {
        category: String,
    },
    /// Resolve an address to coordinates
    Geocode {
        address: String,
    },
    /// Print the active configuration without secrets
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let runtime = MapDataRuntime::initialize().context("failed to initialise runtime")?;

    match cli.command {
        Command::Listings { category } => {
            let category = Category::parse(&category)?;
            let coordinator = runtime.coordinator()?;
            let outcome = coordinator
                .load(category, false)
                .await
                .with_context(|| format!("failed to load {category}"))?;
            let listings = outcome.into_listings().unwrap_or_default();
            println!("{}", serde_json::to_string_pretty(listings.as_slice())?);
        }
        Command::Geocode { address } => {
            let resolved = runtime.resolve_address(&address).await?;
            println!("{}", serde_json::to_string_pretty(&resolved)?);
        }
        Command::Config => {
            println!(
                "{}",
                serde_json::to_string_pretty(&runtime.config().public_profile())?
            );
        }
    }

    runtime.shutdown();
    Ok(())
}
