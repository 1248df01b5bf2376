#![forbid(unsafe_code)]

pub mod certd;
pub mod facts;
pub mod remote;
pub mod store;
pub mod sync;
