//! Rate limiting core: configuration model, loader, counter store, clock
//! and jitter sources, and the evaluator that ties them together.

pub mod clock;
pub mod descriptor;
pub mod evaluator;
pub mod jitter;
pub mod loader;
pub mod model;
pub mod store;

pub use descriptor::DescriptorKey;
pub use model::{Configuration, RateLimit, TimeUnit};
