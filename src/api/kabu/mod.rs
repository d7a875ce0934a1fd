//! kabu STATION API (auカブコム証券) REST client

pub mod api;
pub mod auth;
pub mod get_board;
pub mod get_positions;
pub mod get_wallet_cash;
pub mod send_order;
