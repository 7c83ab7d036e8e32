#[macro_use]
extern crate rocket;

mod api;
mod auth;
mod db;
mod env;
mod error;
mod models;
mod sweep;
mod telemetry;
#[cfg(test)]
mod test;
mod validation;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use auth::{
    TokenService, bad_request_api, forbidden_api, not_found_api, unauthorized_api,
    unprocessable_api,
};
use env::AppConfig;
use rocket::fairing::AdHoc;
use rocket::{Build, Rocket};
use sqlx::SqlitePool;
use sweep::ExpirySweeper;
use telemetry::{TelemetryFairing, init_tracing};
use tracing::info;

#[rocket::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = env::load_environment() {
        eprintln!("Failed to load environment files: {}", e);
    }

    let _telemetry = init_tracing()?;
    let config = AppConfig::from_env().context("Invalid configuration")?;

    let pool = db::connect_pool(&config.database_url).await?;

    info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Database migration failed")?;
    info!("Migrations completed successfully");

    if let Some(seed) = &config.admin_seed {
        db::ensure_admin(&pool, &seed.email, &seed.password)
            .await
            .context("Failed to create bootstrap admin")?;
    }

    init_rocket(pool, config)
        .launch()
        .await
        .map_err(|e| anyhow::anyhow!("Rocket failed: {}", e))?;

    Ok(())
}

pub fn init_rocket(pool: SqlitePool, config: AppConfig) -> Rocket<Build> {
    info!("Starting gym tracker");

    let tokens = TokenService::new(
        &config.jwt_secret,
        chrono::Duration::hours(config.token_ttl_hours),
    );
    let sweep_interval = Duration::from_secs(config.expiry_sweep_interval_secs);

    rocket::build()
        .manage(pool)
        .manage(tokens)
        .manage(config)
        .mount("/api", api::routes())
        .mount("/", routes![api::health])
        .register(
            "/",
            catchers![
                bad_request_api,
                unauthorized_api,
                forbidden_api,
                not_found_api,
                unprocessable_api
            ],
        )
        .attach(TelemetryFairing)
        .attach(AdHoc::on_liftoff("Membership expiry sweeper", move |rocket| {
            Box::pin(async move {
                let Some(pool) = rocket.state::<SqlitePool>().cloned() else {
                    tracing::error!("Database pool missing, expiry sweeper not started");
                    return;
                };
                let sweeper = Arc::new(ExpirySweeper::new(pool, sweep_interval));
                rocket::tokio::spawn(sweeper.run(rocket.shutdown()));
            })
        }))
}
