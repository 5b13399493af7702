use actix_files as fs;
use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};
use sqlx::PgPool;
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{
    Authenticator, PasswordHasher, PgRevocationStore, PgUserDirectory, TokenCodec,
};
use crate::configuration::Settings;
use crate::logger::RequestLogger;
use crate::middleware::AuthenticationMiddleware;
use crate::routes::{
    create_calculation, delete_calculation, get_calculation, get_current_user, health_check,
    list_calculations, login, logout, refresh, register, update_calculation,
};

pub fn run(
    listener: TcpListener,
    connection: PgPool,
    settings: Settings,
) -> Result<Server, std::io::Error> {
    let codec = TokenCodec::new(&settings.jwt)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))?;

    // The Postgres-backed store makes revocations survive a restart; swap in
    // InMemoryRevocationStore for single-process deployments.
    let authenticator = Arc::new(Authenticator::new(
        codec,
        Arc::new(PgRevocationStore::new(connection.clone())),
        Arc::new(PgUserDirectory::new(connection.clone())),
        Duration::from_millis(settings.jwt.store_timeout_ms),
    ));
    let hasher = web::Data::new(PasswordHasher::new(&settings.hashing));

    // Housekeeping: revocation entries may be dropped once the token they
    // revoke has itself expired.
    let janitor = PgRevocationStore::new(connection.clone());
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(3600));
        loop {
            interval.tick().await;
            match janitor.purge_expired().await {
                Ok(purged) if purged > 0 => {
                    tracing::info!(purged = purged, "Purged expired revocation entries")
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "Revocation purge failed"),
            }
        }
    });

    let connection = web::Data::new(connection);
    let authenticator_data = web::Data::new(authenticator.clone());

    let server = HttpServer::new(move || {
        App::new()
            .wrap(RequestLogger)

            // Shared state
            .app_data(connection.clone())
            .app_data(authenticator_data.clone())
            .app_data(hasher.clone())

            // Public routes
            .route("/health_check", web::get().to(health_check))
            .route("/auth/register", web::post().to(register))
            .route("/auth/login", web::post().to(login))
            .route("/auth/refresh", web::post().to(refresh))

            // Protected routes
            .service(
                web::scope("/api")
                    .wrap(AuthenticationMiddleware::new(authenticator.clone()))
                    .route("/me", web::get().to(get_current_user))
                    .route("/logout", web::post().to(logout)),
            )
            .service(
                web::scope("/calculations")
                    .wrap(AuthenticationMiddleware::new(authenticator.clone()))
                    .route("", web::post().to(create_calculation))
                    .route("", web::get().to(list_calculations))
                    .route("/{calc_id}", web::get().to(get_calculation))
                    .route("/{calc_id}", web::put().to(update_calculation))
                    .route("/{calc_id}", web::delete().to(delete_calculation)),
            )

            // Static pages (must be last so it never shadows API routes)
            .service(fs::Files::new("/", "./public").index_file("index.html"))
    })
    .listen(listener)?
    .run();

    Ok(server)
}
