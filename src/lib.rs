pub mod config;
pub mod controller;
pub mod domain;
pub mod error;
pub mod forecast;
pub mod publish;
pub mod telemetry;
