//! Persistence of accumulation state across restarts
//! Copyright (c) 2025 Mohammad Atashi <mohammadaliatashi@icloud.com>

pub mod checkpoint;
pub mod format;

pub use self::checkpoint::{CheckpointError, CheckpointLog, CheckpointRecord, CheckpointWriter};
pub use self::format::NumberFormat;
