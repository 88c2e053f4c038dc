//! Broker-driven projector loop.

use std::time::Duration;

use broker::{CAMPAIGN_EVENTS, Delivery, MessageBroker, Subscription, Topic};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::Result;
use crate::projector::{ApplyOutcome, EventProjector};
use crate::store::ReadModelStore;

/// Default durable subscription name of the campaign projection.
pub const DEFAULT_SUBSCRIPTION: &str = "campaign-management-campaign-projection";

/// Default bound on one receive, and thus on shutdown latency.
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(1);

/// Projector worker settings.
#[derive(Debug, Clone)]
pub struct ProjectorConfig {
    pub topic: Topic,
    pub subscription: String,
    pub receive_timeout: Duration,
}

impl Default for ProjectorConfig {
    fn default() -> Self {
        Self {
            topic: Topic::scoped(CAMPAIGN_EVENTS),
            subscription: DEFAULT_SUBSCRIPTION.to_string(),
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
        }
    }
}

impl ProjectorConfig {
    pub fn with_topic(mut self, topic: Topic) -> Self {
        self.topic = topic;
        self
    }

    pub fn with_subscription(mut self, subscription: impl Into<String>) -> Self {
        self.subscription = subscription.into();
        self
    }

    pub fn with_receive_timeout(mut self, receive_timeout: Duration) -> Self {
        self.receive_timeout = receive_timeout;
        self
    }
}

/// Consumes the campaign topic and feeds each message to the projector,
/// one at a time.
///
/// A message is acknowledged once the projector reaches a final outcome and
/// negatively acknowledged when applying it fails, so a failed event is
/// redelivered instead of dropped.
pub struct ProjectorWorker<R: ReadModelStore, B: MessageBroker> {
    projector: EventProjector<R>,
    broker: B,
    config: ProjectorConfig,
}

impl<R: ReadModelStore, B: MessageBroker> ProjectorWorker<R, B> {
    pub fn new(store: R, broker: B, config: ProjectorConfig) -> Self {
        Self {
            projector: EventProjector::new(store),
            broker,
            config,
        }
    }

    pub fn projector(&self) -> &EventProjector<R> {
        &self.projector
    }

    /// Runs until `shutdown` turns true.
    ///
    /// The signal is checked between receives; a message being applied is
    /// always finished and settled first.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut subscription = self
            .broker
            .subscribe(&self.config.topic, &self.config.subscription)
            .await?;

        info!(
            topic = %self.config.topic,
            subscription = %self.config.subscription,
            "projector started"
        );

        while !*shutdown.borrow_and_update() {
            match subscription.receive(self.config.receive_timeout).await {
                Ok(Some(delivery)) => {
                    self.process(subscription.as_mut(), &delivery).await;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "receive failed, backing off");
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.receive_timeout) => {}
                        _ = shutdown.changed() => {}
                    }
                }
            }
        }

        info!("projector stopped");
        Ok(())
    }

    /// Applies one delivery and settles it with the broker.
    pub async fn process(
        &self,
        subscription: &mut dyn Subscription,
        delivery: &Delivery,
    ) -> Option<ApplyOutcome> {
        match self.projector.handle_payload(&delivery.payload).await {
            Ok(outcome) => {
                if let Err(e) = subscription.ack(delivery).await {
                    warn!(error = %e, message_id = %delivery.message_id, "ack failed");
                }
                Some(outcome)
            }
            Err(e) => {
                error!(
                    error = %e,
                    message_id = %delivery.message_id,
                    redelivery_count = delivery.redelivery_count,
                    "projection failed, requesting redelivery"
                );
                metrics::counter!("projector_apply_failures_total").increment(1);
                if let Err(e) = subscription.nack(delivery).await {
                    warn!(error = %e, message_id = %delivery.message_id, "nack failed");
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryReadModel;
    use broker::InMemoryBroker;
    use chrono::Utc;
    use common::{AggregateId, EventEnvelope, Version};
    use domain::{
        BrandId, CampaignCreatedData, CampaignEvent, CampaignStatus, CampaignType, DomainEvent,
        Money, Objective,
    };

    fn payload(id: AggregateId, version: i64, event: &CampaignEvent) -> Vec<u8> {
        EventEnvelope::builder()
            .event_type(event.event_type())
            .aggregate_id(id)
            .version(Version::new(version))
            .data_raw(event.to_data().unwrap())
            .try_build()
            .unwrap()
            .to_bytes()
            .unwrap()
    }

    fn created(id: AggregateId) -> CampaignEvent {
        CampaignEvent::CampaignCreated(CampaignCreatedData {
            campaign_id: id,
            brand_id: BrandId::new(),
            name: "Launch".to_string(),
            description: None,
            campaign_type: CampaignType::Loyalty,
            objective: Objective::Engagement,
            total_budget: Money::zero(),
            sales_target: 0,
            engagement_target: 0,
            target_audience: None,
            channels: None,
            terms: None,
            created_at: Utc::now(),
        })
    }

    fn config() -> ProjectorConfig {
        ProjectorConfig::default().with_receive_timeout(Duration::from_millis(20))
    }

    #[tokio::test]
    async fn failed_apply_is_nacked_and_redelivered() {
        let broker = InMemoryBroker::with_redelivery_delay(Duration::from_millis(10));
        let topic = config().topic;
        let worker = ProjectorWorker::new(InMemoryReadModel::new(), broker.clone(), config());
        let mut subscription = broker.subscribe(&topic, "test").await.unwrap();

        broker.publish(&topic, "k", b"{broken").await.unwrap();

        let first = subscription
            .receive(Duration::from_secs(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(worker.process(subscription.as_mut(), &first).await, None);

        let again = subscription
            .receive(Duration::from_secs(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(again.message_id, first.message_id);
        assert_eq!(again.redelivery_count, 1);
    }

    #[tokio::test]
    async fn acknowledged_message_is_not_redelivered() {
        let broker = InMemoryBroker::with_redelivery_delay(Duration::from_millis(10));
        let topic = config().topic;
        let worker = ProjectorWorker::new(InMemoryReadModel::new(), broker.clone(), config());
        let mut subscription = broker.subscribe(&topic, "test").await.unwrap();
        let id = AggregateId::new();

        broker
            .publish(&topic, &id.to_string(), &payload(id, 1, &created(id)))
            .await
            .unwrap();
        let delivery = subscription
            .receive(Duration::from_secs(1))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(
            worker.process(subscription.as_mut(), &delivery).await,
            Some(ApplyOutcome::Applied)
        );
        assert!(
            subscription
                .receive(Duration::from_millis(50))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn run_projects_until_shutdown() {
        let broker = InMemoryBroker::new();
        let store = InMemoryReadModel::new();
        let worker = ProjectorWorker::new(store.clone(), broker.clone(), config());
        let topic = config().topic;
        let id = AggregateId::new();
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move { worker.run(rx).await });

        let event = created(id);
        broker
            .publish(&topic, &id.to_string(), &payload(id, 1, &event))
            .await
            .unwrap();
        let activated = CampaignEvent::activated(id, BrandId::new(), "Launch".to_string(), false);
        broker
            .publish(&topic, &id.to_string(), &payload(id, 3, &activated))
            .await
            .unwrap();

        let mut projected = None;
        for _ in 0..100 {
            projected = store.get(id).await.unwrap();
            if projected
                .as_ref()
                .is_some_and(|v| v.last_applied_version == Version::new(3))
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("projector did not stop")
            .unwrap()
            .unwrap();

        let view = projected.unwrap();
        assert_eq!(view.status, CampaignStatus::Active);
        assert_eq!(view.last_applied_version, Version::new(3));
    }
}
