//! Payment-provider webhook. The provider tells us a subscription invoice
//! was paid for some customer; we flag that user premium for the billing
//! period. Payment flows themselves are initiated elsewhere.

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};

use crate::storage::Storage;
use crate::AppResult;

const PAYMENT_SUCCEEDED: &str = "invoice.payment_succeeded";
const PREMIUM_PERIOD: Duration = Duration::days(30);

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct PaymentEvent {
    #[serde(rename = "type")]
    kind: String,
    customer_id: String,
}

pub(super) async fn webhook(
    State(storage): State<Storage>,
    Json(event): Json<PaymentEvent>,
) -> AppResult<Response> {
    if event.kind == PAYMENT_SUCCEEDED {
        match storage.get_user_by_stripe_customer(&event.customer_id).await? {
            Some(user) => {
                let expires_at = (OffsetDateTime::now_utc() + PREMIUM_PERIOD).unix_timestamp();
                storage.update_user_premium(user.id, true, Some(expires_at)).await?;
                info!(user_id = user.id, "premium activated");
            }
            // webhooks must still be acknowledged or the provider retries forever
            None => warn!(customer_id = %event.customer_id, "payment event for unknown customer"),
        }
    }
    Ok(Json(json!({ "received": true })).into_response())
}
