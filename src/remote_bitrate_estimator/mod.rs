mod aimd_rate_control;
mod bwe_defines;

pub use aimd_rate_control::*;
pub use bwe_defines::*;
