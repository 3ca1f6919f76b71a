use crate::configuration::Settings;
use crate::db::HistoryStore;
use crate::deploy::Deployer;
use crate::helpers::JsonResponse;
use crate::middleware;
use crate::routes;
use actix_cors::Cors;
use actix_web::{dev::Server, error, web, App, HttpServer};
use std::net::TcpListener;
use std::sync::Arc;
use tracing_actix_web::TracingLogger;

/// Long-lived collaborators shared by every worker.
pub struct AppServices {
    pub deployer: Deployer,
    pub history: Arc<dyn HistoryStore>,
}

pub async fn run(
    listener: TcpListener,
    settings: Settings,
    services: AppServices,
) -> Result<Server, std::io::Error> {
    let settings = web::Data::new(settings);
    let deployer = web::Data::new(services.deployer);
    let history: web::Data<dyn HistoryStore> = web::Data::from(services.history);

    let json_config = web::JsonConfig::default().error_handler(|err, _req| {
        let detail = match &err {
            error::JsonPayloadError::Deserialize(err) => format!(
                "line {}, column {}: {}",
                err.line(),
                err.column(),
                err
            ),
            other => other.to_string(),
        };
        JsonResponse::build()
            .set_error(detail)
            .bad_request("Invalid data")
    });

    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .wrap(Cors::permissive())
            .service(web::scope("/health_check").service(routes::health_check))
            .service(
                web::scope("/api")
                    .service(routes::api_health)
                    .service(
                        web::scope("/deploy")
                            .wrap(middleware::AdminAuthentication::new())
                            .service(routes::deployment::start_handler)
                            .service(routes::deployment::setup_nginx_handler)
                            .service(routes::deployment::status_handler)
                            .service(routes::deployment::reset_handler)
                            .service(routes::deployment::test_connection_handler),
                    )
                    .service(
                        web::scope("/deployment-history")
                            .wrap(middleware::AdminAuthentication::new())
                            .service(routes::deployment_history::list_handler)
                            .service(routes::deployment_history::add_handler)
                            .service(routes::deployment_history::update_handler),
                    ),
            )
            .app_data(json_config.clone())
            .app_data(deployer.clone())
            .app_data(history.clone())
            .app_data(settings.clone())
    })
    .listen(listener)?
    .run();

    Ok(server)
}
