use anyhow::Result;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use shared::{OrderNotice, ORDER_CREATED};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time;
use tracing::{error, info, warn};

use crate::db::DbPool;
use crate::models::*;
use crate::relay::NotificationRelay;
use crate::schema::*;

const BATCH_SIZE: i64 = 100;

/// Delivers events written by the order transaction once it has committed.
/// Each event gets exactly one delivery attempt; it is marked processed
/// whatever the outcome so a flaky chat never replays old orders.
pub struct OutboxProcessor {
    pool: DbPool,
    relay: NotificationRelay,
    wake: Arc<Notify>,
    poll_interval: Duration,
}

impl OutboxProcessor {
    pub fn new(pool: DbPool, relay: NotificationRelay, wake: Arc<Notify>, poll_interval: Duration) -> Self {
        Self { pool, relay, wake, poll_interval }
    }

    pub async fn run(&self) {
        let mut interval = time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = self.wake.notified() => {}
            }

            if let Err(e) = self.process_outbox_events().await {
                error!("Error processing outbox events: {}", e);
            }
        }
    }

    pub async fn process_outbox_events(&self) -> Result<usize> {
        let mut conn = self.pool.get().await?;

        let unprocessed_events = outbox_events::table
            .filter(outbox_events::processed.eq(false))
            .order(outbox_events::created_at.asc())
            .limit(BATCH_SIZE)
            .load::<DbOutboxEvent>(&mut conn)
            .await?;

        let count = unprocessed_events.len();
        for event in unprocessed_events {
            // Claimed before delivery: a crash between the two steps loses
            // at most this one notification instead of repeating it.
            let claimed = diesel::update(
                outbox_events::table
                    .filter(outbox_events::id.eq(event.id))
                    .filter(outbox_events::processed.eq(false)),
            )
            .set(outbox_events::processed.eq(true))
            .execute(&mut conn)
            .await?;
            if claimed == 0 {
                continue;
            }

            self.deliver(&event).await;
        }

        Ok(count)
    }

    async fn deliver(&self, event: &DbOutboxEvent) {
        if event.event_type != ORDER_CREATED {
            warn!(event_id = %event.id, event_type = %event.event_type, "skipping unknown outbox event");
            return;
        }

        match serde_json::from_value::<OrderNotice>(event.event_data.clone()) {
            Ok(notice) => {
                if self.relay.push_new_order(&notice).await {
                    info!("Published outbox event: {}", event.id);
                }
            }
            Err(e) => error!(event_id = %event.id, error = %e, "undecodable outbox payload"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::orders::OrderEngine;
    use crate::relay::tests::{Call, RecordingChannel};
    use serde_json::json;
    use shared::OutboxEvent;

    fn processor(pool: DbPool, channel: Arc<RecordingChannel>) -> OutboxProcessor {
        let wake = Arc::new(Notify::new());
        let orders = OrderEngine::new(pool.clone(), wake.clone());
        let relay = NotificationRelay::new(channel, "-100200".to_string(), orders, pool.clone());
        OutboxProcessor::new(pool, relay, wake, Duration::from_secs(2))
    }

    async fn insert(pool: &DbPool, event: OutboxEvent) -> uuid::Uuid {
        let mut conn = pool.get().await.unwrap();
        let row = DbOutboxEvent::from(event);
        let id = row.id;
        diesel::insert_into(outbox_events::table).values(&row).execute(&mut conn).await.unwrap();
        id
    }

    async fn is_processed(pool: &DbPool, id: uuid::Uuid) -> bool {
        let mut conn = pool.get().await.unwrap();
        outbox_events::table
            .find(id)
            .select(outbox_events::processed)
            .first(&mut conn)
            .await
            .unwrap()
    }

    fn notice(order_id: &str) -> OrderNotice {
        OrderNotice {
            order_id: order_id.to_string(),
            order_no: "ORD-20261017120000-0000000000AA".to_string(),
            table_code: "TB001".to_string(),
            note: None,
            items: vec![],
            total_usd: 0,
            total_khr: 0,
        }
    }

    #[tokio::test]
    #[ignore]
    async fn each_event_is_attempted_once_even_when_delivery_fails() {
        let pool = test_pool().await;
        let channel = Arc::new(RecordingChannel { fail: true, ..Default::default() });
        let processor = processor(pool.clone(), channel.clone());

        let order_id = crate::engine::new_id("ODR");
        let id = insert(&pool, OutboxEvent::order_created(&notice(&order_id)).unwrap()).await;

        processor.process_outbox_events().await.unwrap();
        processor.process_outbox_events().await.unwrap();

        assert!(is_processed(&pool, id).await);
        let sends = channel
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Send { text, .. } if text.contains(&order_id)))
            .count();
        assert_eq!(sends, 1);
    }

    #[tokio::test]
    #[ignore]
    async fn undecodable_payloads_are_marked_processed() {
        let pool = test_pool().await;
        let channel = Arc::new(RecordingChannel::default());
        let processor = processor(pool.clone(), channel.clone());

        let mut event = OutboxEvent::order_created(&notice("ODR_broken")).unwrap();
        event.event_data = json!({ "unexpected": true });
        let id = insert(&pool, event).await;

        processor.process_outbox_events().await.unwrap();
        assert!(is_processed(&pool, id).await);
        assert!(!channel
            .calls()
            .iter()
            .any(|c| matches!(c, Call::Send { text, .. } if text.contains("ODR_broken"))));
    }
}
