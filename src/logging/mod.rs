pub mod activity_store;
pub mod trade_logger;
