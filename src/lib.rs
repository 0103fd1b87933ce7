pub mod actors;
pub mod config;
pub mod dispatcher;
pub mod errors;
pub mod gateway;
pub mod identity;
pub mod messaging;
pub mod metrics;
pub mod models;
pub mod storage;
pub mod test_utils;
pub mod utils;
