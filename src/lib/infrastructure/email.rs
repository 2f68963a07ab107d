//! Mail transport adapters

pub mod smtp;
