pub mod fare_scan;
pub mod geo;
pub mod realtime;
pub mod trip_progress;

pub use fare_scan::FareScanProcessor;
pub use realtime::ProgressBroadcast;
pub use trip_progress::TripProgressEngine;
