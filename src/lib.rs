#![forbid(unsafe_code)]

pub mod cli;
pub mod crawl;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod formats;
pub mod logging;
pub mod sitemap;
pub mod store;
