//! Coco Brown CLI - drive a cart session from the terminal.
//!
//! Every invocation behaves like one storefront page load: the stored cart
//! is recovered (or discarded if stale), one action is applied, and the
//! resulting cart is shown.
//!
//! # Usage
//!
//! ```bash
//! # List the catalog
//! cocobrown catalog
//!
//! # Add a brownie, then buy three
//! cocobrown cart add 1
//! cocobrown cart set 1 3
//!
//! # Show or empty the cart
//! cocobrown cart show
//! cocobrown cart clear
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use cocobrown_core::ProductId;
use cocobrown_storefront::{CartConfig, StorefrontError};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use commands::cart::Operation;

mod commands;

#[derive(Parser)]
#[command(name = "cocobrown")]
#[command(author, version, about = "Coco Brown cart tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List products with their prices
    Catalog,
    /// Inspect or change the stored cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
}

#[derive(Subcommand)]
enum CartAction {
    /// Show the cart
    Show,
    /// Add one unit of a product
    Add {
        /// Product ID
        id: i32,
    },
    /// Set the quantity of a product in the cart (0 or less removes it)
    Set {
        /// Product ID
        id: i32,

        /// New quantity (values above 99 are capped)
        #[arg(allow_negative_numbers = true)]
        quantity: i64,
    },
    /// Remove a product from the cart
    Remove {
        /// Product ID
        id: i32,
    },
    /// Empty the cart and delete stored state
    Clear,
}

impl From<CartAction> for Operation {
    fn from(action: CartAction) -> Self {
        match action {
            CartAction::Show => Self::Show,
            CartAction::Add { id } => Self::Add(ProductId::new(id)),
            CartAction::Set { id, quantity } => Self::SetQuantity(ProductId::new(id), quantity),
            CartAction::Remove { id } => Self::Remove(ProductId::new(id)),
            CartAction::Clear => Self::Clear,
        }
    }
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &CartConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
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

/// Initialize tracing with `EnvFilter` and Sentry integration.
fn init_tracing() {
    // Defaults to info level for our crates if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "cocobrown_storefront=info,cocobrown_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match CartConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            init_tracing();
            tracing::error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Sentry must be initialized before the tracing subscriber
    let _sentry_guard = init_sentry(&config);
    init_tracing();

    match run(cli, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            e.capture();
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli, config: &CartConfig) -> Result<(), StorefrontError> {
    match cli.command {
        Commands::Catalog => commands::catalog::list(config)?,
        Commands::Cart { action } => {
            commands::cart::run(config, action.into())?;
        }
    }
    Ok(())
}
