//! engagic-core: ingestion, queueing and LLM summarization pipeline for
//! local-government meeting agendas.
//!
//! Seven components, one data flow: a vendor adapter fetches a city's
//! meetings, the store persists them and enqueues processing work, the
//! fetcher and processor drain that queue, the matter tracker links
//! recurring agenda items across meetings, and a small admin/stats surface
//! exposes the operational counters an operator needs.

pub mod admin;
pub mod config;
pub mod domain;
pub mod errors;
pub mod extractor;
pub mod fetcher;
pub mod ids;
pub mod llm;
pub mod matter_tracker;
pub mod observability;
pub mod processor;
pub mod rate_limit;
pub mod store;
pub mod types;
pub mod vendors;
pub mod wrappers;
