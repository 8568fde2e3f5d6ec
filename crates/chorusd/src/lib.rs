//! Chorus daemon library
//!
//! Answers a prompt by asking several models at once, then picking or merging
//! their answers. Exposed over HTTP by the `chorusd` binary.

pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod fanout;
pub mod judge;
pub mod metrics;
pub mod pipeline;
pub mod policy;
pub mod registry;
pub mod routes;
pub mod server;
pub mod streaming;
pub mod synth;

pub use config::Config;
pub use error::PipelineError;
pub use pipeline::{Pipeline, SessionSink};
pub use server::AppState;
