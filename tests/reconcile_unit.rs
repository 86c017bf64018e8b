use serde_json::json;

use autovitrine::api::mercadopago::normalize_payment;
use autovitrine::api::webhooks_mercadopago::{
    WebhookEvent, sign_hmac_sha256_hex, signature_manifest, verify_webhook_signature,
};
use autovitrine::reconcile::{ServiceKind, classify_title, plan_months_from_title};

#[test]
fn classify_package_and_highlight_titles() {
    assert_eq!(classify_title("PACOTE 6 MESES"), Some(ServiceKind::Package));
    assert_eq!(classify_title("DESTAQUE"), Some(ServiceKind::Highlight));
    assert_eq!(classify_title("DESTAQUE PREMIUM"), Some(ServiceKind::Highlight));
    assert_eq!(classify_title("ANUNCIO SIMPLES"), None);
}

#[test]
fn classification_is_case_sensitive() {
    assert_eq!(classify_title("pacote 6 meses"), None);
    assert_eq!(classify_title("destaque"), None);
}

#[test]
fn plan_months_parses_each_tier() {
    assert_eq!(plan_months_from_title("PACOTE 3 MESES"), Some(3));
    assert_eq!(plan_months_from_title("PACOTE 6 MESES"), Some(6));
    assert_eq!(plan_months_from_title("PACOTE 9 MESES"), Some(9));
    assert_eq!(plan_months_from_title("PACOTE PREMIUM"), None);
}

#[test]
fn plan_months_first_match_wins() {
    // "3" is checked first, so an unrelated digit shadows the real tier.
    assert_eq!(plan_months_from_title("PACOTE 9 MESES EDICAO 365"), Some(3));
}

#[test]
fn normalize_payment_handles_numeric_ids() {
    let raw = json!({
        "id": 12345678901_u64,
        "status": "approved",
        "external_reference": "42",
        "payer": { "email": "buyer@example.com" },
        "items": [{ "title": "PACOTE 6 MESES" }]
    });

    let details = normalize_payment("12345678901", &raw);
    assert_eq!(details.id, "12345678901");
    assert_eq!(details.status, "approved");
    assert_eq!(details.payer_email.as_deref(), Some("buyer@example.com"));
    assert_eq!(details.external_reference.as_deref(), Some("42"));
    assert_eq!(details.item_title.as_deref(), Some("PACOTE 6 MESES"));
}

#[test]
fn normalize_payment_defaults_missing_fields() {
    let raw = json!({ "status": "rejected" });

    let details = normalize_payment("77", &raw);
    assert_eq!(details.id, "77");
    assert_eq!(details.status, "rejected");
    assert_eq!(details.payer_email, None);
    assert_eq!(details.external_reference, None);
    assert_eq!(details.item_title, None);
}

#[test]
fn webhook_event_payment_id_accepts_string_and_number() {
    let ev: WebhookEvent = serde_json::from_value(json!({
        "id": 1,
        "type": "payment",
        "data": { "id": "123" },
        "action": "payment.updated"
    }))
    .expect("parse");
    assert_eq!(ev.payment_id(), "123");

    let ev: WebhookEvent =
        serde_json::from_value(json!({ "type": "payment", "data": { "id": 456 } }))
            .expect("parse");
    assert_eq!(ev.payment_id(), "456");

    let ev: WebhookEvent = serde_json::from_value(json!({ "type": "test" })).expect("parse");
    assert_eq!(ev.payment_id(), "");
}

#[test]
fn webhook_event_accepts_topic_alias() {
    let ev: WebhookEvent =
        serde_json::from_value(json!({ "topic": "payment", "data": { "id": "9" } }))
            .expect("parse");
    assert_eq!(ev.event_type, "payment");
}

#[test]
fn valid_signature_verifies() {
    let secret = "test-webhook-secret";
    let data_id = "12345";
    let request_id = "req-abc";
    let ts = chrono::Utc::now().timestamp().to_string();

    let manifest = signature_manifest(data_id, request_id, &ts);
    let v1 = sign_hmac_sha256_hex(secret, &manifest);
    let header = format!("ts={ts},v1={v1}");

    assert!(verify_webhook_signature(secret, &header, request_id, data_id));
}

#[test]
fn signature_with_wrong_secret_fails() {
    let data_id = "12345";
    let request_id = "req-abc";
    let ts = chrono::Utc::now().timestamp().to_string();

    let manifest = signature_manifest(data_id, request_id, &ts);
    let v1 = sign_hmac_sha256_hex("other-secret", &manifest);
    let header = format!("ts={ts},v1={v1}");

    assert!(!verify_webhook_signature("test-webhook-secret", &header, request_id, data_id));
}

#[test]
fn stale_signature_fails() {
    let secret = "test-webhook-secret";
    let data_id = "12345";
    let request_id = "req-abc";
    let ts = (chrono::Utc::now().timestamp() - 3600).to_string();

    let manifest = signature_manifest(data_id, request_id, &ts);
    let v1 = sign_hmac_sha256_hex(secret, &manifest);
    let header = format!("ts={ts},v1={v1}");

    assert!(!verify_webhook_signature(secret, &header, request_id, data_id));
}

#[test]
fn malformed_signature_header_fails() {
    assert!(!verify_webhook_signature("secret", "garbage", "req", "1"));
    assert!(!verify_webhook_signature("secret", "ts=abc,v1=def", "req", "1"));
    assert!(!verify_webhook_signature("secret", "", "req", "1"));
}
