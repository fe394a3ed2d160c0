// Domain layer: records, coordinates, precision tags and the ports the pipelines depend on.

pub mod model;
pub mod ports;
