pub mod config;
pub mod connectivity;
pub mod delivery;
pub mod drain_trigger;
pub mod error;
pub mod event_loop;
pub mod ingest_listener;
pub mod planner;
pub mod sample;
pub mod store;
pub mod transport;

#[cfg(test)]
mod testing;
