pub mod config;
pub mod errors;
pub mod fsm;
pub mod logging;
pub mod notify;
pub mod permissions;
pub mod reviewer;
pub mod service;
pub mod store;
pub mod stream;
