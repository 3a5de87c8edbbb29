use actix_web::{web, App, HttpServer};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

mod config;
mod error;
mod handlers;
mod models;
mod object_store;
mod pagination;
mod preview;
mod s3_backend;
mod selection;
mod server;

use config::{ConfigStore, ConfigUpdate};
use server::Server;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file, created with defaults if missing
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// S3-compatible endpoint URL (overrides the config file)
    #[arg(long)]
    endpoint_url: Option<String>,

    /// Public bucket to browse (overrides the config file)
    #[arg(long)]
    bucket: Option<String>,

    /// Entries per listing page, 1 to 1000 (overrides the config file)
    #[arg(long)]
    page_size: Option<u32>,

    /// Browse sessions kept before the least recently used is dropped
    #[arg(long, default_value_t = server::DEFAULT_SESSION_LIMIT)]
    max_sessions: usize,

    /// Seconds of inactivity after which a browse session expires
    #[arg(long, default_value_t = server::DEFAULT_SESSION_IDLE.as_secs())]
    session_idle_secs: u64,

    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:8000")]
    bind: String,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let config_store = ConfigStore::new(args.config);
    let config = config_store.load_or_create().merged(ConfigUpdate {
        endpoint_url: args.endpoint_url,
        bucket_name: args.bucket,
        page_size: args.page_size,
    });

    let server = match Server::new(config_store, config.clone()) {
        Ok(server) => server.with_session_limits(
            args.max_sessions,
            Duration::from_secs(args.session_idle_secs),
        ),
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    };
    let server_data = web::Data::new(server);

    tracing::info!("Starting server at http://{}", args.bind);
    tracing::info!(
        "Browsing bucket {} at {} ({} entries per page)",
        config.bucket_name,
        config.endpoint_url,
        config.page_size
    );

    HttpServer::new(move || {
        let cors = actix_cors::Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header();

        App::new()
            .wrap(cors)
            .app_data(server_data.clone())
            .configure(handlers::configure)
    })
    .bind(&args.bind)?
    .run()
    .await
}
