pub mod api;
pub mod config;
pub mod db;
pub mod notify;
pub mod server;

pub use self::config::Config;
