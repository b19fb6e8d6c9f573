use crate::debounce::FlushHandler;
use crate::dispatch::Dispatcher;
use crate::event::{DebounceKey, RatingEvent};
use crate::notification;
use crate::poster::PosterManager;
use async_trait::async_trait;
use tracing::{info, warn};

/// What happens to a flushed event: poster, notification, delivery.
pub struct Relay {
    posters: PosterManager,
    dispatcher: Dispatcher,
}

impl Relay {
    pub fn new(posters: PosterManager, dispatcher: Dispatcher) -> Self {
        Self {
            posters,
            dispatcher,
        }
    }

    pub async fn deliver(&self, event: &RatingEvent) -> bool {
        let poster = self
            .posters
            .publish(&event.artwork_path, &event.display_title)
            .await;
        if poster.is_none() {
            warn!("Sending '{}' without a poster", event.display_title);
        }

        let document = notification::build(event, poster.as_deref());
        match self.dispatcher.send(&document).await {
            Ok(()) => {
                info!("Sent notification: {}", document.title());
                true
            }
            // Already logged by the dispatcher; the event is not retried.
            Err(_) => false,
        }
    }
}

#[async_trait]
impl FlushHandler for Relay {
    async fn on_flush(&self, key: DebounceKey, event: RatingEvent) {
        if !self.deliver(&event).await {
            warn!("Dropped notification for {}", key);
        }
    }
}
