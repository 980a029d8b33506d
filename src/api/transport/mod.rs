mod bandwidth_usage;
mod network_types;

pub use bandwidth_usage::*;
pub use network_types::*;
