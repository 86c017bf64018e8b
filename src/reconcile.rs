// src/reconcile.rs
//
// Reconciliation engine: matches a provider payment against the pending
// purchase records and applies the terminal transition. Stateless per
// delivery; every mutation is a conditional update on `status = 'pending'`
// so concurrent deliveries of the same payment cannot double-apply.

use chrono::{Duration, Months, Utc};
use sqlx::PgPool;
use std::fmt;

use crate::api::mercadopago::PaymentDetails;
use crate::db;

/// Every highlight tier currently gets the same window. Pending a per-tier
/// duration decision from product, this stays a single constant.
pub const HIGHLIGHT_WINDOW_DAYS: i64 = 30;

pub const PACKAGE_KEYWORD: &str = "PACOTE";
pub const HIGHLIGHT_KEYWORD: &str = "DESTAQUE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    Package,
    Highlight,
}

impl ServiceKind {
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "package" => Some(ServiceKind::Package),
            "highlight" => Some(ServiceKind::Highlight),
            _ => None,
        }
    }
}

/// Legacy dispatch: case-sensitive substring search on the line-item title.
/// Used only for transactions created before the explicit kind column.
pub fn classify_title(title: &str) -> Option<ServiceKind> {
    if title.contains(PACKAGE_KEYWORD) {
        return Some(ServiceKind::Package);
    }
    if title.contains(HIGHLIGHT_KEYWORD) {
        return Some(ServiceKind::Highlight);
    }
    None
}

/// Legacy duration parse: "3", "6", "9" checked in that order, first match
/// wins. A title carrying an unrelated digit (a model year, for instance)
/// picks the wrong count; the checkout-time `plan_months` column bypasses
/// this path entirely.
pub fn plan_months_from_title(title: &str) -> Option<u32> {
    for (needle, months) in [("3", 3u32), ("6", 6), ("9", 9)] {
        if title.contains(needle) {
            return Some(months);
        }
    }
    None
}

#[derive(Debug)]
pub enum ReconcileError {
    /// Payer email has no account. Redelivery cannot change the outcome, so
    /// the webhook acks after logging.
    UserNotFound(String),
    /// No pending purchase record matches the payment. Same ack policy.
    NoMatchingPendingRecord(String),
    /// Store mutation failed; surfaced as non-200 so the provider redelivers.
    Store(sqlx::Error),
}

impl fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileError::UserNotFound(email) => {
                write!(f, "no user for payer email {email}")
            }
            ReconcileError::NoMatchingPendingRecord(detail) => {
                write!(f, "no matching pending record: {detail}")
            }
            ReconcileError::Store(e) => write!(f, "store error: {e}"),
        }
    }
}

impl From<sqlx::Error> for ReconcileError {
    fn from(value: sqlx::Error) -> Self {
        Self::Store(value)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    SubscriptionActivated {
        transaction_id: i32,
        subscription_id: i32,
        months: u32,
    },
    HighlightActivated {
        transaction_id: i32,
        highlight_id: i32,
        vehicle_id: i32,
    },
    TransactionFailed {
        transaction_id: i32,
    },
    /// The payment id was already stamped on a transaction, or a concurrent
    /// delivery won the conditional update.
    AlreadyProcessed,
    /// Payment status this pipeline does not handle.
    Ignored {
        status: String,
    },
}

/// Entry point: apply one authoritative payment to the purchase records.
pub async fn apply_payment(
    pool: &PgPool,
    details: &PaymentDetails,
) -> Result<Outcome, ReconcileError> {
    if let Some((tx_id, status)) =
        db::find_transaction_by_provider_payment_id(pool, &details.id).await?
    {
        log::info!(
            "payment {} already applied to transaction {tx_id} (status={status}), skipping",
            details.id
        );
        return Ok(Outcome::AlreadyProcessed);
    }

    match details.status.as_str() {
        "approved" => apply_approved(pool, details).await,
        "rejected" => apply_rejected(pool, details).await,
        other => {
            log::warn!("payment {} has unhandled status '{other}', ignoring", details.id);
            Ok(Outcome::Ignored {
                status: other.to_string(),
            })
        }
    }
}

async fn apply_approved(
    pool: &PgPool,
    details: &PaymentDetails,
) -> Result<Outcome, ReconcileError> {
    let email = details.payer_email.as_deref().unwrap_or_default();
    let user_id = db::find_user_id_by_email(pool, email)
        .await?
        .ok_or_else(|| ReconcileError::UserNotFound(email.to_string()))?;

    let Some(tx) = correlate_pending_transaction(pool, user_id, details).await? else {
        return Err(ReconcileError::NoMatchingPendingRecord(format!(
            "no pending transaction for user {user_id} (payment {})",
            details.id
        )));
    };

    let title = details.item_title.as_deref().unwrap_or_default();
    let kind = tx
        .service_kind
        .as_deref()
        .and_then(ServiceKind::from_db)
        .or_else(|| classify_title(title));

    match kind {
        Some(ServiceKind::Package) => activate_package(pool, user_id, &tx, title, details).await,
        Some(ServiceKind::Highlight) => activate_vehicle_highlight(pool, &tx, details).await,
        None => Err(ReconcileError::NoMatchingPendingRecord(format!(
            "cannot classify item '{title}' for transaction {}",
            tx.id
        ))),
    }
}

/// Exact match on the correlation token first; the oldest-pending scan is
/// kept only as a compatibility fallback and logged when it fires.
async fn correlate_pending_transaction(
    pool: &PgPool,
    user_id: i32,
    details: &PaymentDetails,
) -> Result<Option<db::PendingTransaction>, ReconcileError> {
    if let Some(reference) = details.external_reference.as_deref() {
        if !reference.is_empty() {
            if let Some(tx) =
                db::find_pending_transaction_by_reference(pool, user_id, reference).await?
            {
                return Ok(Some(tx));
            }
        }
    }

    let fallback = db::find_oldest_pending_transaction(pool, user_id).await?;
    if let Some(tx) = &fallback {
        log::warn!(
            "payment {}: no exact reference match, falling back to oldest pending transaction {} for user {user_id}",
            details.id,
            tx.id
        );
    }
    Ok(fallback)
}

async fn activate_package(
    pool: &PgPool,
    user_id: i32,
    tx: &db::PendingTransaction,
    title: &str,
    details: &PaymentDetails,
) -> Result<Outcome, ReconcileError> {
    let months = tx
        .plan_months
        .and_then(|m| u32::try_from(m).ok())
        .or_else(|| plan_months_from_title(title));
    let Some(months) = months else {
        return Err(ReconcileError::NoMatchingPendingRecord(format!(
            "no plan duration on transaction {} and none parseable from '{title}'",
            tx.id
        )));
    };

    let Some((subscription_id, _)) = db::find_oldest_pending_subscription(pool, user_id).await?
    else {
        return Err(ReconcileError::NoMatchingPendingRecord(format!(
            "no pending subscription for user {user_id} (payment {})",
            details.id
        )));
    };

    if !db::complete_transaction(pool, tx.id, &details.id).await? {
        return Ok(Outcome::AlreadyProcessed);
    }

    let starts_at = Utc::now();
    let ends_at = match starts_at.checked_add_months(Months::new(months)) {
        Some(t) => t,
        None => starts_at + Duration::days(30 * i64::from(months)),
    };

    if !db::activate_subscription(pool, subscription_id, tx.id, starts_at, ends_at).await? {
        log::warn!(
            "subscription {subscription_id} no longer pending while completing transaction {}",
            tx.id
        );
        return Ok(Outcome::AlreadyProcessed);
    }

    log::info!(
        "activated subscription {subscription_id} for user {user_id}: {months} months, transaction {}, payment {}",
        tx.id,
        details.id
    );
    Ok(Outcome::SubscriptionActivated {
        transaction_id: tx.id,
        subscription_id,
        months,
    })
}

async fn activate_vehicle_highlight(
    pool: &PgPool,
    tx: &db::PendingTransaction,
    details: &PaymentDetails,
) -> Result<Outcome, ReconcileError> {
    let reference = details.external_reference.as_deref().unwrap_or_default();
    let Ok(vehicle_id) = reference.parse::<i32>() else {
        return Err(ReconcileError::NoMatchingPendingRecord(format!(
            "highlight payment {} has non-numeric external_reference '{reference}'",
            details.id
        )));
    };

    let Some(highlight_id) = db::find_pending_highlight_for_vehicle(pool, vehicle_id).await? else {
        return Err(ReconcileError::NoMatchingPendingRecord(format!(
            "no pending highlight for vehicle {vehicle_id} (payment {})",
            details.id
        )));
    };

    if !db::complete_transaction(pool, tx.id, &details.id).await? {
        return Ok(Outcome::AlreadyProcessed);
    }

    let starts_at = Utc::now();
    let ends_at = starts_at + Duration::days(HIGHLIGHT_WINDOW_DAYS);

    if !db::activate_highlight(pool, highlight_id, tx.id, starts_at, ends_at).await? {
        log::warn!(
            "highlight {highlight_id} no longer pending while completing transaction {}",
            tx.id
        );
        return Ok(Outcome::AlreadyProcessed);
    }

    log::info!(
        "activated highlight {highlight_id} for vehicle {vehicle_id}: transaction {}, payment {}",
        tx.id,
        details.id
    );
    Ok(Outcome::HighlightActivated {
        transaction_id: tx.id,
        highlight_id,
        vehicle_id,
    })
}

/// Rejected payments fail the matched transaction and touch nothing else.
/// Scoped to the paying user; a rejected payment with an unknown payer is
/// surfaced as `UserNotFound` like the approved path.
async fn apply_rejected(
    pool: &PgPool,
    details: &PaymentDetails,
) -> Result<Outcome, ReconcileError> {
    let email = details.payer_email.as_deref().unwrap_or_default();
    let user_id = db::find_user_id_by_email(pool, email)
        .await?
        .ok_or_else(|| ReconcileError::UserNotFound(email.to_string()))?;

    let Some(tx) = correlate_pending_transaction(pool, user_id, details).await? else {
        return Err(ReconcileError::NoMatchingPendingRecord(format!(
            "no pending transaction to fail for user {user_id} (payment {})",
            details.id
        )));
    };

    if !db::fail_transaction(pool, tx.id, &details.id).await? {
        return Ok(Outcome::AlreadyProcessed);
    }

    log::info!("marked transaction {} failed, payment {} rejected", tx.id, details.id);
    Ok(Outcome::TransactionFailed {
        transaction_id: tx.id,
    })
}
