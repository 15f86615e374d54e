use async_trait::async_trait;

use crate::errors::CoreError;
use crate::models::rate::RawTick;

/// Trait abstraction for all raw price-feed sources.
///
/// Each provider (Pyth Hermes today) implements this trait. Providers only
/// return raw ticks; interpreting a feed id is the normalizer's job, so a
/// provider can be swapped without touching rate conventions.
#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// Human-readable name of this provider (for logs/errors).
    fn name(&self) -> &str;

    /// Fetch the latest tick for each requested feed id.
    ///
    /// Ids may come back in any order and some may be missing; neither is
    /// an error.
    async fn fetch_latest(&self, feed_ids: &[String]) -> Result<Vec<RawTick>, CoreError>;
}

/// Callback receiving each batch of ticks pushed by a `TickStream`.
pub type TickSink<'a> = &'a (dyn Fn(Vec<RawTick>) + Send + Sync);

/// A push source of raw ticks, such as a server-sent event stream.
#[async_trait]
pub trait TickStream: Send + Sync {
    fn name(&self) -> &str;

    /// Open the stream for `feed_ids` and hand every batch to `sink` until
    /// the connection ends. `Ok` means the server closed the stream.
    async fn stream(&self, feed_ids: &[String], sink: TickSink<'_>) -> Result<(), CoreError>;
}
