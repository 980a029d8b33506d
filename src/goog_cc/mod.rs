mod cellular_ratio_receiver;
mod delay_based_bwe;
mod delay_increase_detector_interface;
mod inter_arrival_delta;
mod link_capacity_estimator;
mod trendline_estimator;

pub use cellular_ratio_receiver::*;
pub use delay_based_bwe::*;
pub use delay_increase_detector_interface::*;
pub use inter_arrival_delta::*;
pub use link_capacity_estimator::*;
pub use trendline_estimator::*;
