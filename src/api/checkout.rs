// src/api/checkout.rs

use actix_web::{HttpResponse, Responder, post, web};
use serde::Deserialize;
use serde_json::json;
use sqlx::Row;
use utoipa::ToSchema;

use crate::api::mercadopago;
use crate::{AppState, db};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    /// Authenticated upstream; the gateway forwards the account id.
    pub user_id: i32,

    pub plan_slug: String,

    /// Required for highlight plans: the listing being boosted.
    pub vehicle_id: Option<i32>,
}

/// Creates the provider checkout preference and the pending purchase records
/// the webhook pipeline later reconciles. Packages carry the transaction id
/// as the correlation token; highlights carry the vehicle id, which is also
/// the webhook-side match key for the highlight row.
#[utoipa::path(
    post,
    path = "/api/checkout",
    tag = "checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "Checkout created, payment link returned"),
        (status = 400, description = "Unknown plan, user or vehicle"),
        (status = 502, description = "Provider preference creation failed")
    )
)]
#[post("/checkout")]
pub async fn create_checkout(
    state: web::Data<AppState>,
    payload: web::Json<CheckoutRequest>,
) -> impl Responder {
    let plan = match db::get_plan_by_slug(&state.pool, &payload.plan_slug).await {
        Ok(Some(p)) => p,
        Ok(None) => return HttpResponse::BadRequest().json(json!({"error": "invalid plan"})),
        Err(e) => {
            log::error!("get_plan_by_slug error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    let payer_email = match sqlx::query("SELECT email FROM users WHERE id = $1")
        .bind(payload.user_id)
        .fetch_optional(&state.pool)
        .await
    {
        Ok(Some(r)) => r.get::<String, _>("email"),
        Ok(None) => return HttpResponse::BadRequest().json(json!({"error": "user not found"})),
        Err(e) => {
            log::error!("select user email error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    let vehicle_id = if plan.kind == "highlight" {
        let Some(vehicle_id) = payload.vehicle_id else {
            return HttpResponse::BadRequest()
                .json(json!({"error": "vehicle_id required for highlight plans"}));
        };
        let owned = sqlx::query("SELECT id FROM vehicles WHERE id = $1 AND user_id = $2")
            .bind(vehicle_id)
            .bind(payload.user_id)
            .fetch_optional(&state.pool)
            .await;
        match owned {
            Ok(Some(_)) => Some(vehicle_id),
            Ok(None) => {
                return HttpResponse::BadRequest().json(json!({"error": "invalid vehicle"}));
            }
            Err(e) => {
                log::error!("select vehicle error: {e}");
                return HttpResponse::InternalServerError().finish();
            }
        }
    } else {
        None
    };

    let unit_price = match plan.price.parse::<f64>() {
        Ok(p) => p,
        Err(e) => {
            log::error!("plan {} has unparseable price {}: {e}", plan.slug, plan.price);
            return HttpResponse::InternalServerError().finish();
        }
    };

    let tx_payload = json!({
        "user_id": payload.user_id,
        "payer_email": payer_email,
        "plan_slug": plan.slug,
        "plan_kind": plan.kind,
        "vehicle_id": vehicle_id,
    });

    let tx_id =
        match db::insert_pending_transaction(&state.pool, payload.user_id, &plan, tx_payload).await
        {
            Ok(id) => id,
            Err(e) => {
                log::error!("insert pending transaction error: {e}");
                return HttpResponse::InternalServerError().finish();
            }
        };

    let external_reference = match vehicle_id {
        Some(v) => v.to_string(),
        None => tx_id.to_string(),
    };
    if let Err(e) =
        db::set_transaction_external_reference(&state.pool, tx_id, &external_reference).await
    {
        log::error!("set external_reference error: {e}");
        return HttpResponse::InternalServerError().finish();
    }

    log::info!(
        "checkout user_id={} plan={} tx_id={tx_id} external_reference={external_reference}",
        payload.user_id,
        plan.slug
    );
    let preference = match mercadopago::create_preference(
        &state.mp_access_token,
        mercadopago::CreatePreferenceRequest {
            title: plan.title.clone(),
            unit_price,
            currency_id: plan.currency.clone(),
            external_reference: external_reference.clone(),
            payer_email: Some(payer_email),
        },
    )
    .await
    {
        Ok(p) => p,
        Err(e) => {
            log::error!("create_preference error for transaction {tx_id}: {e}");
            return HttpResponse::BadGateway().json(json!({
                "error": "payment provider unavailable"
            }));
        }
    };

    let record = match vehicle_id {
        Some(v) => {
            db::insert_pending_highlight(&state.pool, v, payload.user_id, &plan.slug).await
        }
        None => {
            db::insert_pending_subscription(&state.pool, payload.user_id, &plan.title, plan.months)
                .await
        }
    };
    if let Err(e) = record {
        log::error!("insert pending entitlement error for transaction {tx_id}: {e}");
        return HttpResponse::InternalServerError().finish();
    }

    HttpResponse::Ok().json(json!({
        "transaction_id": tx_id,
        "preference_id": preference.id,
        "init_point": preference.init_point
    }))
}
