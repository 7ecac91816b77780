pub mod agent;
pub mod config;
pub mod documents;
pub mod errors;
pub mod models;
pub mod retrieval;
pub mod routes;
pub mod service;
