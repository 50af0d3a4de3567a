//! Plain data types exchanged with storage drivers.
//!
//! Everything here is a value type: configs are loaded once, results are
//! returned per call and never persisted by the driver.

pub mod disk;
pub mod multipart;
pub mod object;
