//! Shared types for the soundtab daemon and popup: the tab data model, the
//! popup wire protocol, configuration and platform paths.

pub mod config;
pub mod media;
pub mod platform;
pub mod protocol;
