// src/api/entitlements.rs
//
// Read paths that trust the activation windows written by the
// reconciliation engine; no payment re-validation happens here.

use actix_web::{HttpResponse, Responder, get, web};
use chrono::Utc;
use serde_json::json;

use crate::{AppState, db};

/// Home-page featured section: listings with a currently-open highlight
/// window.
#[get("/listings/featured")]
pub async fn featured_listings(state: web::Data<AppState>) -> impl Responder {
    match db::list_featured_listings(&state.pool).await {
        Ok(listings) => HttpResponse::Ok().json(listings),
        Err(e) => {
            log::error!("featured_listings db error: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

/// Plan usage for one account: the subscription whose window covers now,
/// with days remaining.
#[get("/users/{user_id}/plan-usage")]
pub async fn plan_usage(
    state: web::Data<AppState>,
    path: web::Path<i32>,
) -> impl Responder {
    let user_id = path.into_inner();

    match db::get_active_subscription(&state.pool, user_id).await {
        Ok(Some(sub)) => {
            let days_remaining = sub
                .ends_at
                .map(|ends| (ends - Utc::now()).num_days().max(0))
                .unwrap_or(0);
            HttpResponse::Ok().json(json!({
                "plan": sub.plan_name,
                "months": sub.months,
                "starts_at": sub.starts_at,
                "ends_at": sub.ends_at,
                "days_remaining": days_remaining,
            }))
        }
        Ok(None) => HttpResponse::Ok().json(json!({"plan": null})),
        Err(e) => {
            log::error!("plan_usage db error: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}
