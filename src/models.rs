// src/models.rs

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Purchasable product: a renewal plan (`kind = "package"`) or a listing
/// highlight (`kind = "highlight"`). `title` is the string the payment
/// provider echoes back as the line-item title on webhooks.
#[derive(Debug, Serialize)]
pub struct Plan {
    pub id: i32,
    pub slug: String,
    pub title: String,
    pub kind: String, // package | highlight
    pub months: Option<i32>,
    pub price: String,
    pub currency: String,
    pub is_active: bool,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct Transaction {
    pub id: i32,
    pub user_id: i32,
    pub plan_id: Option<i32>,
    pub service_kind: Option<String>, // package | highlight
    pub plan_months: Option<i32>,
    pub external_reference: Option<String>,
    /// Provider payment id, stamped at the terminal transition. Unique, so a
    /// redelivered webhook short-circuits instead of re-matching.
    pub provider_payment_id: Option<String>,
    pub amount: String,
    pub currency: String,
    pub status: String, // pending | completed | failed
    pub payload: Option<serde_json::Value>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct Subscription {
    pub id: i32,
    pub user_id: i32,
    pub transaction_id: Option<i32>,
    pub plan_name: String,
    pub months: Option<i32>,
    pub status: String, // pending | active
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct Highlight {
    pub id: i32,
    pub vehicle_id: i32,
    pub user_id: i32,
    pub transaction_id: Option<i32>,
    pub highlight_type: String,
    pub status: String, // pending | active
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Row returned by the home-page featured-listings query.
#[derive(Debug, Serialize)]
pub struct FeaturedListing {
    pub vehicle_id: i32,
    pub title: String,
    pub price: String,
    pub highlight_type: String,
    pub highlighted_until: Option<DateTime<Utc>>,
}
