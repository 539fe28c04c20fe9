// Domain layer: core models and ports (interfaces), plus the batch algorithms.

pub mod model;
pub mod ports;
pub mod schema;
pub mod value;

pub mod services;
