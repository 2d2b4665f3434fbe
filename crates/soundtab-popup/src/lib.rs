pub mod connection;
pub mod state;
pub mod theme;
pub mod ui;
