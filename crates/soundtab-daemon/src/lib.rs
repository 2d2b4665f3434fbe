pub mod bridge;
pub mod cache;
pub mod commands;
pub mod core;
pub mod host;
pub mod http;
pub mod indicator;
pub mod logging;
pub mod scan;
pub mod selectors;
pub mod skip;
pub mod socket;
pub mod sync;
