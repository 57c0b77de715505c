//! Vitrine CLI - Drive the cart and wishlist engine from a terminal.
//!
//! # Usage
//!
//! ```bash
//! # Add two units of a clothing item in size 3
//! vitrine cart add 5 --type roupas --size 3 --quantity 2
//!
//! # Show the cart with its subtotal
//! vitrine cart list
//!
//! # Put a bag on the wishlist
//! vitrine wishlist add 9 --type bolsas
//!
//! # Inspect an account's stored snapshot
//! vitrine snapshot show --email someone@example.com
//! ```
//!
//! # Commands
//!
//! - `cart` - List, add, increment, decrement, remove, clear
//! - `wishlist` - List, add, remove, clear
//! - `snapshot` - Show or clear stored account snapshots
//! - `size-standard` - Get or set a product's size standard
//! - `migrate` - Import the legacy cart
//!
//! State lives under `VITRINE_STORAGE_DIR`. With `VITRINE_API_URL` and a
//! session configured, changes are also pushed to the commerce backend.

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vitrine_core::ProductType;
use vitrine_sync::SyncConfig;
use vitrine_sync::preferences::SizeStandard;

mod commands;

#[derive(Parser)]
#[command(name = "vitrine")]
#[command(author, version, about = "Vitrine cart and wishlist tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Manage the wishlist
    Wishlist {
        #[command(subcommand)]
        action: WishlistAction,
    },
    /// Inspect stored account snapshots
    Snapshot {
        #[command(subcommand)]
        action: SnapshotAction,
    },
    /// Remembered size standard of a product
    SizeStandard {
        #[command(subcommand)]
        action: SizeStandardAction,
    },
    /// Import the legacy cart, if one is stored
    Migrate,
}

/// Identifies a cart line.
#[derive(clap::Args)]
struct LineArgs {
    /// Product id
    product: i32,

    /// Product type (`bolsas`, `roupas`, `calcados`)
    #[arg(short = 't', long = "type", default_value = "roupas")]
    product_type: ProductType,

    /// Size id
    #[arg(short, long)]
    size: Option<i32>,
}

#[derive(Subcommand)]
enum CartAction {
    /// List cart lines and the subtotal
    List,
    /// Add units of a product
    Add {
        #[command(flatten)]
        line: LineArgs,

        /// Units to add
        #[arg(short, long, default_value_t = 1)]
        quantity: u32,

        /// Display title
        #[arg(long)]
        title: Option<String>,

        /// Unit price
        #[arg(long)]
        price: Option<Decimal>,
    },
    /// Add one unit to a line
    Inc {
        #[command(flatten)]
        line: LineArgs,
    },
    /// Remove one unit from a line (never below 1)
    Dec {
        #[command(flatten)]
        line: LineArgs,
    },
    /// Remove a line
    Remove {
        #[command(flatten)]
        line: LineArgs,
    },
    /// Empty the cart
    Clear,
}

#[derive(Subcommand)]
enum WishlistAction {
    /// List wishlist entries
    List,
    /// Put a product on the wishlist
    Add {
        /// Product id
        product: i32,

        /// Product type (`bolsas`, `roupas`, `calcados`)
        #[arg(short = 't', long = "type", default_value = "roupas")]
        product_type: ProductType,

        /// Display title
        #[arg(long)]
        title: Option<String>,
    },
    /// Take a product off the wishlist
    Remove {
        /// Product id
        product: i32,

        /// Product type (`bolsas`, `roupas`, `calcados`)
        #[arg(short = 't', long = "type", default_value = "roupas")]
        product_type: ProductType,
    },
    /// Empty the wishlist
    Clear,
}

#[derive(Subcommand)]
enum SnapshotAction {
    /// List accounts with a stored snapshot
    List,
    /// Print an account's snapshot as JSON
    Show {
        /// Account email
        #[arg(short, long)]
        email: String,
    },
    /// Delete an account's snapshot
    Clear {
        /// Account email
        #[arg(short, long)]
        email: String,
    },
}

#[derive(Subcommand)]
enum SizeStandardAction {
    /// Print the remembered standard
    Get {
        /// Product id
        product: i32,
    },
    /// Remember a standard (`br`, `us`, `eu`)
    Set {
        /// Product id
        product: i32,

        /// Size standard
        standard: SizeStandard,
    },
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &SyncConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match SyncConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing_subscriber::fmt::init();
            tracing::error!("Invalid configuration: {e}");
            std::process::exit(2);
        }
    };

    // Sentry must be initialized before the tracing subscriber
    let _sentry_guard = init_sentry(&config);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "vitrine=info,vitrine_sync=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    if let Err(e) = run(cli, &config).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: &SyncConfig) -> Result<(), commands::CliError> {
    let session = commands::Session::open(config)?;

    match cli.command {
        Commands::Cart { action } => match action {
            CartAction::List => commands::cart::list(&session),
            CartAction::Add {
                line,
                quantity,
                title,
                price,
            } => commands::cart::add(&session, &line.into(), quantity, title, price).await?,
            CartAction::Inc { line } => commands::cart::increment(&session, &line.into()).await?,
            CartAction::Dec { line } => commands::cart::decrement(&session, &line.into()).await?,
            CartAction::Remove { line } => commands::cart::remove(&session, &line.into()).await,
            CartAction::Clear => commands::cart::clear(&session).await,
        },
        Commands::Wishlist { action } => match action {
            WishlistAction::List => commands::wishlist::list(&session),
            WishlistAction::Add {
                product,
                product_type,
                title,
            } => commands::wishlist::add(&session, product, product_type, title).await?,
            WishlistAction::Remove {
                product,
                product_type,
            } => commands::wishlist::remove(&session, product, product_type).await,
            WishlistAction::Clear => commands::wishlist::clear(&session).await,
        },
        Commands::Snapshot { action } => match action {
            SnapshotAction::List => commands::snapshot::list(&session)?,
            SnapshotAction::Show { email } => commands::snapshot::show(&session, &email)?,
            SnapshotAction::Clear { email } => commands::snapshot::clear(&session, &email)?,
        },
        Commands::SizeStandard { action } => match action {
            SizeStandardAction::Get { product } => commands::size_standard::get(&session, product),
            SizeStandardAction::Set { product, standard } => {
                commands::size_standard::set(&session, product, standard)?;
            }
        },
        Commands::Migrate => commands::migrate::report(&session),
    }

    session.finish().await;
    Ok(())
}

impl From<LineArgs> for commands::cart::Line {
    fn from(args: LineArgs) -> Self {
        Self {
            product: args.product,
            product_type: args.product_type,
            size: args.size,
        }
    }
}
