// src/api/mercadopago.rs
//
// Minimal client for the MercadoPago REST API.
// Authorization: `Authorization: Bearer <access token>`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

const MP_API_BASE: &str = "https://api.mercadopago.com";
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Base URL, overridable for tests pointed at a mock server.
pub fn api_base() -> String {
    std::env::var("MP_API_BASE_URL").unwrap_or_else(|_| MP_API_BASE.to_string())
}

#[derive(Debug)]
pub enum MercadoPagoError {
    Http(reqwest::Error),
    Api { status: u16, body: String },
    InvalidResponse(String),
}

impl fmt::Display for MercadoPagoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MercadoPagoError::Http(e) => write!(f, "http error: {e}"),
            MercadoPagoError::Api { status, body } => {
                write!(f, "mercadopago api error status={status} body={body}")
            }
            MercadoPagoError::InvalidResponse(e) => write!(f, "invalid response: {e}"),
        }
    }
}

impl From<reqwest::Error> for MercadoPagoError {
    fn from(value: reqwest::Error) -> Self {
        Self::Http(value)
    }
}

fn http_client() -> Result<reqwest::Client, MercadoPagoError> {
    // A hung provider lookup is terminal for the current webhook delivery;
    // the provider retries on its own schedule.
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()?)
}

/// Authoritative payment details reported by the provider. `item_title` is
/// the first line-item title; for highlight purchases `external_reference`
/// carries the vehicle id, for package purchases our transaction id.
#[derive(Debug, Clone)]
pub struct PaymentDetails {
    pub id: String,
    pub status: String,
    pub payer_email: Option<String>,
    pub external_reference: Option<String>,
    pub item_title: Option<String>,
}

fn json_string(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// The payment-detail endpoint reports the id as a number while the webhook
/// carries it as a string. Normalize once so the rest of the pipeline works
/// on owned strings.
pub fn normalize_payment(payment_id: &str, raw: &serde_json::Value) -> PaymentDetails {
    PaymentDetails {
        id: raw
            .get("id")
            .map(json_string)
            .unwrap_or_else(|| payment_id.to_string()),
        status: raw
            .get("status")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        payer_email: raw
            .pointer("/payer/email")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
        external_reference: raw
            .get("external_reference")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
        item_title: raw
            .pointer("/items/0/title")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
    }
}

/// GET /v1/payments/{id}
pub async fn get_payment(
    access_token: &str,
    payment_id: &str,
) -> Result<PaymentDetails, MercadoPagoError> {
    if payment_id.is_empty() {
        return Err(MercadoPagoError::InvalidResponse(
            "empty payment id".to_string(),
        ));
    }

    let client = http_client()?;

    let resp = client
        .get(format!("{}/v1/payments/{payment_id}", api_base()))
        .header("Authorization", format!("Bearer {access_token}"))
        .send()
        .await?;

    let status = resp.status();
    let body = resp.text().await?;

    if !status.is_success() {
        return Err(MercadoPagoError::Api {
            status: status.as_u16(),
            body,
        });
    }

    let raw = serde_json::from_str::<serde_json::Value>(&body)
        .map_err(|e| MercadoPagoError::InvalidResponse(format!("{e}; body={body}")))?;

    Ok(normalize_payment(payment_id, &raw))
}

#[derive(Debug, Serialize)]
pub struct CreatePreferenceRequest {
    pub title: String,
    pub unit_price: f64,
    pub currency_id: String,
    pub external_reference: String,
    pub payer_email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PreferenceResponse {
    pub id: String,
    pub init_point: Option<String>,
}

/// POST /checkout/preferences, creates the hosted-checkout link. The item
/// title is echoed back verbatim on payment webhooks, which is what the
/// legacy classification fallback keys on.
pub async fn create_preference(
    access_token: &str,
    req: CreatePreferenceRequest,
) -> Result<PreferenceResponse, MercadoPagoError> {
    let client = http_client()?;

    let mut body = serde_json::json!({
        "items": [{
            "title": req.title,
            "quantity": 1,
            "unit_price": req.unit_price,
            "currency_id": req.currency_id,
        }],
        "external_reference": req.external_reference,
    });
    if let Some(email) = &req.payer_email {
        body["payer"] = serde_json::json!({ "email": email });
    }

    let resp = client
        .post(format!("{}/checkout/preferences", api_base()))
        .header("Authorization", format!("Bearer {access_token}"))
        .json(&body)
        .send()
        .await?;

    let status = resp.status();
    let body = resp.text().await?;

    if !status.is_success() {
        return Err(MercadoPagoError::Api {
            status: status.as_u16(),
            body,
        });
    }

    serde_json::from_str::<PreferenceResponse>(&body)
        .map_err(|e| MercadoPagoError::InvalidResponse(format!("{e}; body={body}")))
}
