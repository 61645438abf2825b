pub mod config;
pub mod result;
pub mod trade;
