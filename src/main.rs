use std::io;

use actix_web::{middleware, web, App, HttpServer};

use recipe_scaler::config::Config;
use recipe_scaler::{db, handlers};

fn startup_error(e: impl std::error::Error + Send + Sync + 'static) -> io::Error {
    log::error!("startup failed: {}", e);
    io::Error::other(e)
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = Config::from_env().map_err(startup_error)?;

    // set up database connection pool and bring the schema up to date
    let pool = db::build_pool(&config.database_url, config.pool_size).map_err(startup_error)?;
    let mut conn = pool.get().map_err(startup_error)?;
    db::run_migrations(&mut conn).map_err(startup_error)?;
    drop(conn);

    let circuit_breaker = db::circuit_breaker();

    log::info!("starting HTTP server at http://{}", config.bind_address);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(pool.clone()))
            .app_data(web::Data::new(circuit_breaker.clone()))
            .wrap(middleware::Logger::default())
            .configure(handlers::configure)
    })
    .bind(config.bind_address.as_str())?
    .run()
    .await
}
