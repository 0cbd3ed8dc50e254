// src/lib.rs
pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod database;
pub mod error;
pub mod events;
pub mod models;
pub mod services;
pub mod store;
