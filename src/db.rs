// src/db.rs

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use crate::models::{FeaturedListing, Plan, Subscription};

fn map_plan(r: &sqlx::postgres::PgRow) -> Plan {
    Plan {
        id: r.get("id"),
        slug: r.get("slug"),
        title: r.get("title"),
        kind: r.get("kind"),
        months: r.get("months"),
        price: r.get("price"),
        currency: r.get("currency"),
        is_active: r.get("is_active"),
        created_at: r.get("created_at"),
    }
}

pub async fn list_active_plans(pool: &PgPool) -> Result<Vec<Plan>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT id, slug, title, kind, months, price::text as price, currency, is_active, created_at
           FROM plans
           WHERE is_active = true
           ORDER BY price ASC"#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(map_plan).collect())
}

pub async fn get_plan_by_slug(pool: &PgPool, slug: &str) -> Result<Option<Plan>, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT id, slug, title, kind, months, price::text as price, currency, is_active, created_at
           FROM plans
           WHERE slug = $1 AND is_active = true"#,
    )
    .bind(slug)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| map_plan(&r)))
}

pub async fn find_user_id_by_email(pool: &PgPool, email: &str) -> Result<Option<i32>, sqlx::Error> {
    let row = sqlx::query("SELECT id FROM users WHERE email = $1")
        .bind(email)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|r| r.get("id")))
}

/// Replay lookup: a transaction already stamped with this provider payment id
/// means the webhook was applied before.
pub async fn find_transaction_by_provider_payment_id(
    pool: &PgPool,
    payment_id: &str,
) -> Result<Option<(i32, String)>, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT id, status FROM transactions WHERE provider_payment_id = $1"#,
    )
    .bind(payment_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| (r.get("id"), r.get("status"))))
}

/// Fields the reconciliation engine needs from a matched pending transaction.
#[derive(Debug)]
pub struct PendingTransaction {
    pub id: i32,
    pub service_kind: Option<String>,
    pub plan_months: Option<i32>,
}

fn map_pending_tx(r: &sqlx::postgres::PgRow) -> PendingTransaction {
    PendingTransaction {
        id: r.get("id"),
        service_kind: r.get("service_kind"),
        plan_months: r.get("plan_months"),
    }
}

/// Exact correlation: checkout writes the correlation token (transaction id
/// for packages, vehicle id for highlights) into `external_reference`, and
/// the provider echoes it back on the payment.
pub async fn find_pending_transaction_by_reference(
    pool: &PgPool,
    user_id: i32,
    external_reference: &str,
) -> Result<Option<PendingTransaction>, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT id, service_kind, plan_months
           FROM transactions
           WHERE user_id = $1 AND external_reference = $2 AND status = 'pending'
           ORDER BY created_at ASC
           LIMIT 1"#,
    )
    .bind(user_id)
    .bind(external_reference)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| map_pending_tx(&r)))
}

/// Legacy fallback: oldest pending transaction for the user. Ambiguous when a
/// user has two concurrent checkouts; callers log when they resort to this.
pub async fn find_oldest_pending_transaction(
    pool: &PgPool,
    user_id: i32,
) -> Result<Option<PendingTransaction>, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT id, service_kind, plan_months
           FROM transactions
           WHERE user_id = $1 AND status = 'pending'
           ORDER BY created_at ASC
           LIMIT 1"#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| map_pending_tx(&r)))
}

/// Conditional transition pending -> completed, stamping the provider payment
/// id. Returns false when the row was no longer pending (lost race or replay).
pub async fn complete_transaction(
    pool: &PgPool,
    tx_id: i32,
    payment_id: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"UPDATE transactions
           SET status = 'completed', provider_payment_id = $2, paid_at = NOW()
           WHERE id = $1 AND status = 'pending'"#,
    )
    .bind(tx_id)
    .bind(payment_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn fail_transaction(
    pool: &PgPool,
    tx_id: i32,
    payment_id: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"UPDATE transactions
           SET status = 'failed', provider_payment_id = $2
           WHERE id = $1 AND status = 'pending'"#,
    )
    .bind(tx_id)
    .bind(payment_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn find_oldest_pending_subscription(
    pool: &PgPool,
    user_id: i32,
) -> Result<Option<(i32, Option<i32>)>, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT id, months
           FROM subscriptions
           WHERE user_id = $1 AND status = 'pending'
           ORDER BY created_at ASC
           LIMIT 1"#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| (r.get("id"), r.get("months"))))
}

pub async fn activate_subscription(
    pool: &PgPool,
    subscription_id: i32,
    transaction_id: i32,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"UPDATE subscriptions
           SET status = 'active', transaction_id = $2, starts_at = $3, ends_at = $4
           WHERE id = $1 AND status = 'pending'"#,
    )
    .bind(subscription_id)
    .bind(transaction_id)
    .bind(starts_at)
    .bind(ends_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn find_pending_highlight_for_vehicle(
    pool: &PgPool,
    vehicle_id: i32,
) -> Result<Option<i32>, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT id
           FROM highlights
           WHERE vehicle_id = $1 AND status = 'pending'
           ORDER BY created_at ASC
           LIMIT 1"#,
    )
    .bind(vehicle_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.get("id")))
}

pub async fn activate_highlight(
    pool: &PgPool,
    highlight_id: i32,
    transaction_id: i32,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"UPDATE highlights
           SET status = 'active', transaction_id = $2, starts_at = $3, ends_at = $4
           WHERE id = $1 AND status = 'pending'"#,
    )
    .bind(highlight_id)
    .bind(transaction_id)
    .bind(starts_at)
    .bind(ends_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Home-page featured listings: published vehicles whose highlight window
/// covers the current instant. Trusts the window written at activation.
pub async fn list_featured_listings(pool: &PgPool) -> Result<Vec<FeaturedListing>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT v.id as vehicle_id, v.title, v.price::text as price,
                  h.highlight_type, h.ends_at
           FROM vehicles v
           JOIN highlights h ON h.vehicle_id = v.id
           WHERE v.status = 'published'
             AND h.status = 'active'
             AND h.starts_at <= NOW()
             AND h.ends_at >= NOW()
           ORDER BY h.starts_at DESC"#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| FeaturedListing {
            vehicle_id: r.get("vehicle_id"),
            title: r.get("title"),
            price: r.get("price"),
            highlight_type: r.get("highlight_type"),
            highlighted_until: r.get("ends_at"),
        })
        .collect())
}

/// Plan-usage read: the subscription whose activation window covers now.
pub async fn get_active_subscription(
    pool: &PgPool,
    user_id: i32,
) -> Result<Option<Subscription>, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT id, user_id, transaction_id, plan_name, months, status,
                  starts_at, ends_at, created_at
           FROM subscriptions
           WHERE user_id = $1
             AND status = 'active'
             AND starts_at <= NOW()
             AND ends_at >= NOW()
           ORDER BY ends_at DESC
           LIMIT 1"#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| Subscription {
        id: r.get("id"),
        user_id: r.get("user_id"),
        transaction_id: r.get("transaction_id"),
        plan_name: r.get("plan_name"),
        months: r.get("months"),
        status: r.get("status"),
        starts_at: r.get("starts_at"),
        ends_at: r.get("ends_at"),
        created_at: r.get("created_at"),
    }))
}

/// Checkout-time inserts. The transaction is created first so its id can be
/// carried to the provider as the correlation token.
pub async fn insert_pending_transaction(
    pool: &PgPool,
    user_id: i32,
    plan: &Plan,
    payload: serde_json::Value,
) -> Result<i32, sqlx::Error> {
    let row = sqlx::query(
        r#"INSERT INTO transactions
           (user_id, plan_id, service_kind, plan_months, amount, currency, status, payload)
           VALUES ($1, $2, $3, $4, $5::numeric, $6, 'pending', $7)
           RETURNING id"#,
    )
    .bind(user_id)
    .bind(plan.id)
    .bind(&plan.kind)
    .bind(plan.months)
    .bind(&plan.price)
    .bind(&plan.currency)
    .bind(payload)
    .fetch_one(pool)
    .await?;

    Ok(row.get("id"))
}

pub async fn set_transaction_external_reference(
    pool: &PgPool,
    tx_id: i32,
    external_reference: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE transactions SET external_reference = $2 WHERE id = $1")
        .bind(tx_id)
        .bind(external_reference)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn insert_pending_subscription(
    pool: &PgPool,
    user_id: i32,
    plan_name: &str,
    months: Option<i32>,
) -> Result<i32, sqlx::Error> {
    let row = sqlx::query(
        r#"INSERT INTO subscriptions (user_id, plan_name, months, status)
           VALUES ($1, $2, $3, 'pending')
           RETURNING id"#,
    )
    .bind(user_id)
    .bind(plan_name)
    .bind(months)
    .fetch_one(pool)
    .await?;

    Ok(row.get("id"))
}

pub async fn insert_pending_highlight(
    pool: &PgPool,
    vehicle_id: i32,
    user_id: i32,
    highlight_type: &str,
) -> Result<i32, sqlx::Error> {
    let row = sqlx::query(
        r#"INSERT INTO highlights (vehicle_id, user_id, highlight_type, status)
           VALUES ($1, $2, $3, 'pending')
           RETURNING id"#,
    )
    .bind(vehicle_id)
    .bind(user_id)
    .bind(highlight_type)
    .fetch_one(pool)
    .await?;

    Ok(row.get("id"))
}
