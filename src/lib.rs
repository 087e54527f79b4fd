#![warn(rust_2018_idioms)]
#![allow(clippy::module_name_repetitions)]

pub(crate) mod api;
pub mod app;
pub mod calendar;
pub mod config;
pub mod domain;
pub mod fetcher;
pub mod observability;
pub mod reader;
pub mod refresh;
pub mod scheduler;
pub mod store;
pub mod util;

pub use app::{ComponentRegistry, build_router};
pub use config::Config;
