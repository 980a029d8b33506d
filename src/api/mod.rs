/// Structured event logging: [RtcEventLog](rtc_event_log::RtcEventLog).
pub mod rtc_event_log;

/// Network structs and types.
pub mod transport;

/// Some unit types, such as [DataSize](units::DataSize) and [DataRate](units::DataRate).
pub mod units;
