pub mod config;
pub mod dataset;
pub mod error;
pub mod evaluate;
pub mod index;
pub mod inference;
pub mod models;
pub mod protocol;
pub mod recommend;
pub mod sequence;
pub mod server;
pub mod training;
pub mod transport;
