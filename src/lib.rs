//! CRM Pipeline & Contact-Action API Library
//!
//! This library provides the core functionality for the pipeline API,
//! including the Kanban stage state machine, contact action suggestions,
//! deep-link execution, the offline replay queue and the HTTP handlers.
//!
//! # Modules
//!
//! - `cache_validator`: Checksummed cache/blob entries.
//! - `circuit_breaker`: Circuit breaker guarding gateway replay.
//! - `config`: Configuration management.
//! - `connectivity`: Shared online/offline flag.
//! - `errors`: Error handling types.
//! - `execution`: Action execution and deep-link construction.
//! - `gateway_client`: CRM backend client.
//! - `handlers`: HTTP request handlers and router.
//! - `models`: Core data models.
//! - `offline_queue`: Persistent offline action queue.
//! - `pipeline`: Board filtering, grouping, stats and stage mutations.
//! - `stages`: Static stage configuration and transition whitelist.
//! - `storage`: Blob storage port (file-backed and in-memory).
//! - `suggestions`: Contact action suggestion and swipe bindings.

pub mod cache_validator;
pub mod circuit_breaker;
pub mod config;
pub mod connectivity;
pub mod errors;
pub mod execution;
pub mod gateway_client;
pub mod handlers;
pub mod models;
pub mod offline_queue;
pub mod pipeline;
pub mod stages;
pub mod storage;
pub mod suggestions;
