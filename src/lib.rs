pub mod config;
pub mod controller;
pub mod gateway;
pub mod helpers;
pub mod messaging;
pub mod models;
pub mod repositories;
pub mod service;
pub mod standalone;
