#![forbid(unsafe_code)]

pub mod config;
pub mod errors;
pub mod register;
pub mod resolve;
pub mod status;
pub mod traits;
pub mod types;
