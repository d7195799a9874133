pub mod config;
pub mod error;
pub mod headers;
pub mod httpclient;
pub mod metrics;
pub mod proxy;
pub mod pump;
pub mod server;
pub mod spdy;
pub mod uri;
