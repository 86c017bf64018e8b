use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::checkout::create_checkout,
        crate::api::webhooks_mercadopago::mercadopago_webhook
    ),
    components(
        schemas(
            crate::api::checkout::CheckoutRequest,
            crate::api::webhooks_mercadopago::WebhookEvent,
            crate::api::webhooks_mercadopago::WebhookData
        )
    ),
    tags(
        (name = "checkout", description = "Checkout initiation"),
        (name = "webhooks", description = "Payment notifications from MercadoPago")
    )
)]
pub struct ApiDoc;
