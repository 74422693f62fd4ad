mod ai;
mod app;
mod config;
mod delivery;
mod http;
mod kakao;
mod queue;

use crate::app::AppHandles;
use anyhow::Result;
use clap::Parser;
use dotenv::dotenv;
use std::path::PathBuf;
use tracing::log::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

const VERSION: &str = env!("VERSION");

#[derive(Parser)]
#[command(name = "skill-server")]
#[command(about = env!("CARGO_PKG_DESCRIPTION"))]
#[command(version = VERSION)]
struct CliArguments {
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

pub type TracingReloadHandle = reload::Handle<EnvFilter, Registry>;

fn init_tracing() -> TracingReloadHandle {
    let (filter_layer, reload_handle) = reload::Layer::new(EnvFilter::from_default_env());

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt::layer())
        .init();
    info!("build version: {VERSION}");

    reload_handle
}

fn main() -> Result<()> {
    dotenv().ok();

    let tracing_reload = init_tracing();
    let args = CliArguments::parse();
    let config = config::AppConfig::load(args.config)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async move {
            let handles = AppHandles::new(config, tracing_reload)?;
            handles.run().await;
            Ok(())
        })
}
