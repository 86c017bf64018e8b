// src/api/plans.rs

use actix_web::{HttpResponse, Responder, get, web};

use crate::{AppState, db};

#[get("/plans")]
pub async fn list_plans(state: web::Data<AppState>) -> impl Responder {
    match db::list_active_plans(&state.pool).await {
        Ok(plans) => HttpResponse::Ok().json(plans),
        Err(e) => {
            log::error!("list_plans db error: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}
