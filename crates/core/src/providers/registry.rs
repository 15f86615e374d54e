use crate::errors::CoreError;
use crate::models::rate::RawTick;
use crate::models::settings::Settings;

use super::pyth::PythHermesFeed;
use super::traits::PriceFeed;

/// Registry of all available price feeds, in priority order.
///
/// The first feed that answers wins; a failing feed hands over to the next
/// one. New providers can be added without touching the price service.
pub struct FeedRegistry {
    feeds: Vec<Box<dyn PriceFeed>>,
}

impl FeedRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { feeds: Vec::new() }
    }

    /// Create a registry with the default Pyth Hermes feed.
    pub fn new_with_defaults(settings: &Settings) -> Result<Self, CoreError> {
        let mut registry = Self::new();
        registry.register(Box::new(PythHermesFeed::new(
            &settings.hermes_endpoint,
            settings.request_timeout(),
        )?));
        Ok(registry)
    }

    /// Register a new feed at the lowest priority.
    pub fn register(&mut self, feed: Box<dyn PriceFeed>) {
        self.feeds.push(feed);
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }

    /// Names of all feeds, in priority order.
    pub fn names(&self) -> Vec<String> {
        self.feeds.iter().map(|f| f.name().to_string()).collect()
    }

    /// Fetch ticks from the first feed that succeeds.
    ///
    /// Returns `FeedUnavailable` carrying the last provider error when
    /// every feed fails.
    pub async fn fetch_ticks(&self, feed_ids: &[String]) -> Result<Vec<RawTick>, CoreError> {
        if self.feeds.is_empty() {
            return Err(CoreError::ConfigMissing("no price feed registered".into()));
        }

        let mut last_error = None;
        for feed in &self.feeds {
            match feed.fetch_latest(feed_ids).await {
                Ok(ticks) => return Ok(ticks),
                Err(e) => {
                    log::warn!("Price feed {} failed: {e}", feed.name());
                    last_error = Some(e);
                }
            }
        }

        Err(CoreError::FeedUnavailable(
            last_error.map_or_else(|| "no feed answered".to_string(), |e| e.to_string()),
        ))
    }
}

impl Default for FeedRegistry {
    fn default() -> Self {
        Self::new()
    }
}
