//! Core data models for the thumbnail service.
//!
//! Buckets and objects describe what the local blob store holds. Upload events
//! are the finalize notifications that drive the thumbnail pipeline, and
//! gallery records are the documents it appends once a thumbnail is published.

pub mod bucket;
pub mod event;
pub mod gallery;
pub mod object;
