pub mod analogues;
pub mod bundle;
pub mod cache;
pub mod config;
pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod geocoder;
pub mod geometry;
pub mod pipeline;
pub mod throttle;

pub use error::{AnalogueError, Result};

