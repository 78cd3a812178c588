pub mod pass_holder;
pub mod scan;
pub mod trip;

pub use pass_holder::PassHolder;
pub use scan::{LedgerEntry, LedgerKind, ScanOutcome, ScanRecord, ScanStatus};
pub use trip::{ActiveTrip, GeoPoint, Route, Stop, StopEvent, StopEventUpdate, StopStatus};
