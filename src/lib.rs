#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::cast_possible_truncation
)]

pub mod commands;
pub mod config;
pub mod dispatch;
pub mod gateway;
pub mod observability;
pub mod security;
pub mod store;
pub mod tools;
pub mod wechat;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
