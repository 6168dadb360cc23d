mod fetch;
mod ingest;
mod page;
mod routes;

pub mod app;
pub mod config;
pub mod error;
pub mod server;
pub mod telemetry;

pub use app::start_app;
pub use error::AppError;
pub use fetch::RemoteFetcher;
pub use ingest::UploadStore;
pub use server::{router, SharedState};
