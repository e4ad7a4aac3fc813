// AMP subscription endpoints
//
// Subscribe / Ping / Unsubscribe. Subscriptions live only in device memory,
// so a reboot silently drops them and the next Ping reports "none".

use serde_json::json;
use tracing::debug;

use crate::amp::client::AmpClient;
use crate::amp::dispatch::{Operation, Scope};
use crate::amp::models::{PingResponse, SubscribeResponse};
use crate::auth::DeviceAddress;
use crate::error::Error;

impl AmpClient {
    /// Register a push subscription.
    ///
    /// `Subscribe` with `{ "id", "topics", "callback_url" }`. A duplicate
    /// id answers with state `"duplicate"` and the registered callback.
    pub async fn subscribe(
        &self,
        device: &DeviceAddress,
        subscription_id: &str,
        topics: &[String],
        callback_url: &str,
    ) -> Result<SubscribeResponse, Error> {
        debug!(subscription_id, ?topics, callback_url, "subscribing");
        self.call(
            device,
            Operation::Subscribe,
            Scope::Device,
            &json!({
                "id": subscription_id,
                "topics": topics,
                "callback_url": callback_url,
            }),
        )
        .await
    }

    /// Query subscription state. Doubles as keep-alive.
    pub async fn ping(
        &self,
        device: &DeviceAddress,
        subscription_id: &str,
    ) -> Result<PingResponse, Error> {
        self.call(
            device,
            Operation::Ping,
            Scope::Device,
            &json!({ "id": subscription_id }),
        )
        .await
    }

    /// Tear down a subscription.
    pub async fn unsubscribe(
        &self,
        device: &DeviceAddress,
        subscription_id: &str,
    ) -> Result<(), Error> {
        debug!(subscription_id, "unsubscribing");
        self.call_unit(
            device,
            Operation::Unsubscribe,
            Scope::Device,
            &json!({ "id": subscription_id }),
        )
        .await
    }
}
