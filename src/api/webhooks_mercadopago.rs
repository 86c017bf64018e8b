// src/api/webhooks_mercadopago.rs

use actix_web::{HttpRequest, HttpResponse, post, web};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use utoipa::ToSchema;

use crate::api::mercadopago;
use crate::reconcile::{self, ReconcileError};
use crate::AppState;

type HmacSha256 = Hmac<Sha256>;

/// Signatures older than this are rejected as replays.
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// MercadoPago notification body. `data.id` is the payment id; ids arrive as
/// strings or numbers depending on the notification version, so keep them
/// raw until normalized.
#[derive(Debug, Deserialize, ToSchema)]
pub struct WebhookEvent {
    #[serde(default)]
    pub id: Option<serde_json::Value>,

    #[serde(rename = "type", alias = "topic")]
    pub event_type: String,

    #[serde(default)]
    pub data: Option<WebhookData>,

    #[serde(default)]
    pub action: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct WebhookData {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
}

impl WebhookEvent {
    pub fn payment_id(&self) -> String {
        match self.data.as_ref().and_then(|d| d.id.as_ref()) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        }
    }
}

/// HMAC-SHA256 in hex.
pub fn sign_hmac_sha256_hex(secret: &str, data: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(data.as_bytes());
    let result = mac.finalize().into_bytes();
    hex::encode(result)
}

/// The signed manifest for a notification: the provider lowercases the
/// payment id before signing.
pub fn signature_manifest(data_id: &str, request_id: &str, ts: &str) -> String {
    format!("id:{};request-id:{request_id};ts:{ts};", data_id.to_lowercase())
}

/// Verify the provider's `x-signature` header: `ts=<unix>,v1=<hex hmac>`,
/// HMAC-SHA256 over the manifest above.
pub fn verify_webhook_signature(
    secret: &str,
    signature: &str,
    request_id: &str,
    data_id: &str,
) -> bool {
    let mut ts = None;
    let mut v1 = None;
    for part in signature.split(',') {
        let part = part.trim();
        if let Some(t) = part.strip_prefix("ts=") {
            ts = Some(t);
        } else if let Some(s) = part.strip_prefix("v1=") {
            v1 = Some(s);
        }
    }

    let (Some(ts), Some(v1)) = (ts, v1) else {
        log::debug!("webhook signature header malformed: {signature}");
        return false;
    };

    let Ok(ts_num) = ts.parse::<i64>() else {
        log::debug!("webhook signature timestamp not numeric: {ts}");
        return false;
    };

    let age = chrono::Utc::now().timestamp() - ts_num;
    if age > SIGNATURE_TOLERANCE_SECS || age < -60 {
        log::warn!("webhook signature outside tolerance window (age={age}s)");
        return false;
    }

    let manifest = signature_manifest(data_id, request_id, ts);
    let expected = sign_hmac_sha256_hex(secret, &manifest);

    if expected.len() != v1.len() {
        return false;
    }
    expected.as_bytes().ct_eq(v1.as_bytes()).into()
}

fn header<'a>(req: &'a HttpRequest, name: &str) -> &'a str {
    req.headers()
        .get(name)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("")
}

#[utoipa::path(
    post,
    path = "/webhooks/mercadopago",
    tag = "webhooks",
    request_body = WebhookEvent,
    responses(
        (status = 200, description = "Event processed or acknowledged"),
        (status = 401, description = "Signature verification failed"),
        (status = 500, description = "Store mutation failed, provider should retry"),
        (status = 502, description = "Provider lookup failed, provider should retry")
    )
)]
#[post("/webhooks/mercadopago")]
pub async fn mercadopago_webhook(
    req: HttpRequest,
    payload: web::Json<WebhookEvent>,
    state: web::Data<AppState>,
) -> HttpResponse {
    let event = payload.into_inner();
    let payment_id = event.payment_id();

    // Precondition: only events provably sent by the provider get any
    // further processing, including the outbound lookup.
    let signature = header(&req, "x-signature");
    let request_id = header(&req, "x-request-id");
    if !verify_webhook_signature(&state.mp_webhook_secret, signature, request_id, &payment_id) {
        log::warn!("rejected webhook with invalid signature (payment_id={payment_id})");
        return HttpResponse::Unauthorized().json(json!({"error": "invalid signature"}));
    }

    if event.event_type != "payment" {
        return HttpResponse::Ok().json(json!({"success": true, "ignored": true}));
    }

    if payment_id.is_empty() {
        log::warn!("payment webhook without data.id, ignoring");
        return HttpResponse::Ok().json(json!({"success": true, "ignored": true}));
    }

    let details = match mercadopago::get_payment(&state.mp_access_token, &payment_id).await {
        Ok(d) => d,
        Err(e) => {
            // Terminal for this delivery; the provider's retry schedule owns
            // redelivery.
            log::error!("payment {payment_id} lookup failed: {e}");
            return HttpResponse::BadGateway()
                .json(json!({"success": false, "error": "provider lookup failed"}));
        }
    };

    match reconcile::apply_payment(&state.pool, &details).await {
        Ok(outcome) => {
            log::debug!("payment {payment_id} outcome: {outcome:?}");
            HttpResponse::Ok().json(json!({"success": true}))
        }
        // Redelivery cannot change these outcomes without manual
        // intervention, so ack to stop the retry storm.
        Err(e @ ReconcileError::UserNotFound(_))
        | Err(e @ ReconcileError::NoMatchingPendingRecord(_)) => {
            log::error!("payment {payment_id} not reconciled: {e}");
            HttpResponse::Ok().json(json!({"success": true}))
        }
        Err(ReconcileError::Store(e)) => {
            log::error!("payment {payment_id} store error: {e}");
            HttpResponse::InternalServerError()
                .json(json!({"success": false, "error": "store error"}))
        }
    }
}
