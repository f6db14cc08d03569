pub mod aggregate;
pub mod api;
pub mod bus;
pub mod client;
pub mod codec;
pub mod config;
pub mod db;
pub mod docs;
pub mod gateway;
pub mod model;
pub mod poller;
pub mod routes;
pub mod snapshot;
pub mod source;
pub mod store;
