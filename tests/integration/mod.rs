//! Integration tests for the Gleaner analysis pipeline

mod batch_loop;
mod pipeline_end_to_end;
mod store;
mod support;
