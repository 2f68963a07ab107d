//! Adapters for the messaging pipeline: Postgres, SMTP, MiniJinja and HTTP

pub mod config;
pub mod db;
pub mod email;
pub mod http;
pub mod templates;
