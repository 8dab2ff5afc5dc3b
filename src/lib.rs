pub mod config;
pub mod error;
pub mod events;
pub mod http_client;
pub mod local_store;
pub mod reconcile;
pub mod state;
pub mod stats;
pub mod stats_fetch;
pub mod sync;
