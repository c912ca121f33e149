pub mod config;
pub mod cosine;
pub mod deduplication;
pub mod error;
pub mod export;
pub mod pipeline;
pub mod profiler;
pub mod protocol;
pub mod sampling;
pub mod scoring;
pub mod search;
pub mod selector;
pub mod server;
pub mod source;
pub mod text;
pub mod transport;
pub mod types;
