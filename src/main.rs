// src/main.rs
use actix_web::{App, HttpResponse, HttpServer, Responder, web};
use dotenvy::dotenv;
use sqlx::PgPool;
use std::env;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use autovitrine::{AppState, api, docs};

async fn index() -> impl Responder {
    HttpResponse::Ok().body("Service ready!")
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPool::connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    let mp_access_token = env::var("MP_ACCESS_TOKEN").expect("MP_ACCESS_TOKEN required");
    let mp_webhook_secret = env::var("MP_WEBHOOK_SECRET").expect("MP_WEBHOOK_SECRET required");

    let state = web::Data::new(AppState {
        pool,
        mp_access_token,
        mp_webhook_secret,
    });

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .route("/", web::get().to(index))
            .service(
                SwaggerUi::new("/docs/{_:.*}")
                    .url("/api-docs/openapi.json", docs::ApiDoc::openapi()),
            )
            // Public read paths
            .service(api::entitlements::featured_listings)
            // Checkout and account-facing reads (authenticated at the gateway)
            .service(
                web::scope("/api")
                    .service(api::plans::list_plans)
                    .service(api::checkout::create_checkout)
                    .service(api::entitlements::plan_usage),
            )
            // Provider webhooks (signature-verified)
            .service(api::webhooks_mercadopago::mercadopago_webhook)
    })
    .bind(("0.0.0.0", 8070))?
    .run()
    .await
}
