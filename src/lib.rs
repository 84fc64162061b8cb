pub mod catalog;
pub mod config;
pub mod conversation;
pub mod error;
pub mod event;
pub mod lifecycle;
pub mod model;
pub mod notify;
pub mod order_store;
pub mod referral;
pub mod reply;
pub mod service;
pub mod session;
pub mod user_store;
pub mod utils;
