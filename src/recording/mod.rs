//! Session recording of sensor readings to CSV files.

pub mod recorder;

pub use recorder::{ReadingSink, RecorderError, SessionRecorder};
