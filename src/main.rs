use actix_web::{web, App, HttpServer};
use ballot_ledger::config::Config;
use ballot_ledger::handlers::{self, AppState};
use ballot_ledger::{JsonFileStore, LedgerService};
use log::{error, info};
use std::io;
use std::sync::Arc;

fn to_io_error(err: impl std::fmt::Display) -> io::Error {
    io::Error::new(io::ErrorKind::Other, err.to_string())
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env().map_err(|e| {
        error!("invalid configuration: {}", e);
        to_io_error(e)
    })?;

    let store = JsonFileStore::new(&config.data_dir).map_err(to_io_error)?;
    info!("snapshot file: {}", store.path().display());

    let ledger = LedgerService::open(Arc::new(store), config.difficulty).map_err(to_io_error)?;
    let state = web::Data::new(AppState { ledger });

    let (host, port) = config.bind_address();
    info!("ballot ledger listening on {}:{}", host, port);

    HttpServer::new(move || {
        App::new()
            .wrap(handlers::access_logger())
            .app_data(state.clone())
            .configure(handlers::configure)
    })
    .bind((host.as_str(), port))?
    .run()
    .await
}
