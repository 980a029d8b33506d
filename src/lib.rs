//! Delay based bandwidth estimation from WebRTC's Google Congestion Control,
//! with an optional bias from an out of band cellular resource ratio.
//!
//! Transport feedback goes into [DelayBasedBwe](goog_cc::DelayBasedBwe), which
//! runs the inter-arrival grouping, the trendline delay detector and the
//! [AimdRateControl](remote_bitrate_estimator::AimdRateControl) state machine.
//! Cellular samples arrive on a [CellularRatioReceiver](goog_cc::CellularRatioReceiver)
//! thread and are applied on the estimator's thread.

/// Units and network types shared by every module.
pub mod api;

/// Field trial configuration.
pub mod experiments;

/// The delay based estimator and its detectors.
pub mod goog_cc;

/// AIMD rate control.
pub mod remote_bitrate_estimator;

pub mod rtc;
