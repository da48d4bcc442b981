// Compiled-in deployment constants

/// Observer latitude in decimal degrees
pub const OBSERVER_LATITUDE: &str = "34.0181";

/// Observer longitude in decimal degrees (east positive)
pub const OBSERVER_LONGITUDE: &str = "-5.0078";

/// Multiplier applied to the raw AIN1 reading to obtain volts
pub const CALIBRATION_FACTOR: f64 = 18.22;

/// Reads per persisted record (12 × 5 s = one record per minute)
pub const BATCH_SIZE: usize = 12;

/// Spacing between individual reads, in seconds
pub const READ_INTERVAL_SECS: u64 = 5;

/// Reads per record for the fast deployment (10 × 3 s = 30 s)
pub const FAST_BATCH_SIZE: usize = 10;

/// Read spacing for the fast deployment, in seconds
pub const FAST_READ_INTERVAL_SECS: u64 = 3;

/// Minutes added before sunrise and after sunset
pub const WINDOW_MARGIN_MINUTES: i64 = 5;

/// Points kept in the live display window
pub const DISPLAY_POINTS: usize = 80;

/// Points kept in the live display window for the fast deployment
pub const FAST_DISPLAY_POINTS: usize = 90;

/// Lower bound of the current axis (upper bound follows the data)
pub const CURRENT_AXIS_MIN: f64 = 0.0;

/// Voltage axis bounds
pub const VOLTAGE_AXIS_MIN: f64 = 15.0;
pub const VOLTAGE_AXIS_MAX: f64 = 35.0;

/// Prefix of the per-session table, database and export names
pub const SESSION_PREFIX: &str = "daylog";

/// Timestamp layout embedded in session names
pub const SESSION_TIMESTAMP_FORMAT: &str = "%Y_%m_%d__%H_%M_%S";

/// Timestamp layout of stored and exported rows
pub const ROW_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Failed batches in a row before the session is aborted
pub const MAX_CONSECUTIVE_FAILURES: u32 = 10;

/// Longest pause after a failed batch, in seconds
pub const MAX_FAILURE_BACKOFF_SECS: u64 = 60;

/// Attempts to open the device before a session start is given up
pub const DEVICE_OPEN_ATTEMPTS: u32 = 5;

/// First pause between device open attempts, in seconds
pub const DEVICE_OPEN_BACKOFF_SECS: u64 = 2;

/// Longest pause between device open attempts, in seconds
pub const MAX_DEVICE_OPEN_BACKOFF_SECS: u64 = 120;

/// Selector string meaning "first device found" for the LJM driver
pub const LJM_ANY: &str = "ANY";
