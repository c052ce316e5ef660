use cadence_scheduler::{DispatchConfig, Event, EventQueue, QueueError, Trigger};
use chrono::{Duration, Utc};
use serde_json::{Map, json};
use std::time::Duration as StdDuration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Longer than any gap between scheduled deliveries below.
const IDLE_TIMEOUT: StdDuration = StdDuration::from_secs(3);

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,cadence_scheduler=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = DispatchConfig::from_env().expect("failed to load configuration");
    tracing::info!(
        epsilon_ms = config.epsilon_ms,
        max_wait_ms = config.max_wait_ms,
        holidays = config.holidays.len(),
        "Loaded configuration"
    );

    let queue = EventQueue::from_config(&config);
    let calendar = config.calendar();
    let now = Utc::now();

    queue.put(Event::new("ticker.started").with_priority(20));

    let heartbeat = Trigger::every(Duration::milliseconds(500))
        .ending_at(now + Duration::seconds(2))
        .skip_holidays(&calendar)
        .with_epsilon(config.epsilon())
        .build()
        .expect("heartbeat trigger");
    queue.put_with(heartbeat, Event::new("ticker.heartbeat").with_channel("health"));

    let mut payload = Map::new();
    payload.insert("window_secs".to_string(), json!(2));
    let summary = Trigger::once(now + Duration::milliseconds(2500)).with_epsilon(config.epsilon());
    queue.put_with(
        summary,
        Event::new("ticker.summary")
            .with_payload(payload)
            .with_reply_to("ticker"),
    );

    let mut delivered = 0_usize;
    loop {
        match queue.get_timeout(IDLE_TIMEOUT) {
            Ok(event) => {
                delivered += 1;
                tracing::info!(
                    event_id = %event.id(),
                    kind = event.kind(),
                    channel = event.channel(),
                    priority = event.priority(),
                    "Delivered event"
                );
            }
            Err(QueueError::Empty) => break,
            Err(e) => {
                tracing::warn!(error = %e, "Queue wait failed");
                break;
            }
        }
    }

    tracing::info!(delivered, remaining = queue.len(), "Queue drained");
}
