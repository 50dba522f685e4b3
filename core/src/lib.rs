pub mod assistant;
pub mod auth;
pub mod db;
pub mod error;
pub mod json_store;
pub mod llm;
pub mod matcher;
pub mod models;
pub mod service;
pub mod store;
