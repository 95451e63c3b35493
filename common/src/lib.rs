pub mod action;
pub mod config;
pub mod frame;
pub mod shutdown;
