pub mod registry;
pub mod sse;
pub mod traits;

// Feed provider implementations
pub mod pyth;
