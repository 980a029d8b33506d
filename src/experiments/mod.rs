mod field_trials;

pub use field_trials::*;
