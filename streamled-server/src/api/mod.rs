//! HTTP API: the signed webhook endpoint and its extractor.

pub mod eventsub;
pub mod extractors;
