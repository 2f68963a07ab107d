//! Domain layer

pub mod commerce;
pub mod messaging;
