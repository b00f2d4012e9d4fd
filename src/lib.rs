//! Attendance check-in sessions with a tamper-evident, per-student
//! hash-chained ledger.

pub mod checkin;
pub mod clock;
pub mod code;
pub mod config;
pub mod db;
pub mod directory;
pub mod error;
pub mod ipc;
pub mod ledger;
pub mod progress;
pub mod service;
pub mod session;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use db::Store;
pub use directory::{Actor, Role};
pub use error::AttendanceError;
pub use service::AttendanceService;
