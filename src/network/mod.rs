pub mod capture;
pub mod connections;
pub mod correlator;
pub mod link_layer;
pub mod parser;
pub mod platform;
pub mod types;
