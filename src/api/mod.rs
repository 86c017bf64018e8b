pub mod checkout;
pub mod entitlements;
pub mod mercadopago;
pub mod plans;
pub mod webhooks_mercadopago;
