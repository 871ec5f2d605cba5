//! Gleaner: resilient LLM-driven fact extraction
//!
//! Pulls free-text records from SQLite, asks a language model to analyze each
//! one, parses the loosely structured answer and writes the extracted facts
//! back transactionally, retrying and escalating to a fallback preset when
//! things go wrong.

pub mod analysis;
pub mod batch;
pub mod cli;
pub mod config;
pub mod error;
pub mod generator;
pub mod journal;
pub mod logging;
pub mod parser;
pub mod pipeline;
pub mod provider;
pub mod retry;
pub mod source;
pub mod store;
