use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use dict_domain::{EventMap, EventPublisher};
use dict_durable::{Activity, ActivityContext, ActivityError};

use super::domain_failure;

/// A domain event and the key that orders it on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishEvent {
    pub event: EventMap,
    pub partition_key: String,
}

pub struct PublishEventActivity {
    publisher: Arc<dyn EventPublisher>,
}

impl PublishEventActivity {
    pub fn new(publisher: Arc<dyn EventPublisher>) -> Self {
        Self { publisher }
    }
}

#[async_trait]
impl Activity for PublishEventActivity {
    const NAME: &'static str = "PublishEventActivity";
    type Input = PublishEvent;
    type Output = ();

    async fn execute(&self, _ctx: &ActivityContext, input: PublishEvent) -> Result<(), ActivityError> {
        self.publisher
            .publish(&input.event, &input.partition_key)
            .await
            .map_err(domain_failure)
    }
}
