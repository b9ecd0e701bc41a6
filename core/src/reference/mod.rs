//! Configuration and dissimilarity abstraction
//! Stored frames, argument domains and the metric capability interface
//! Copyright (c) 2025 Mohammad Atashi <mohammadaliatashi@icloud.com>

pub mod frame;
pub mod metric;
pub mod periodicity;

pub use self::frame::{FrameLayout, StoredFrame};
pub use self::metric::{
    DotProductDistance, EuclideanDistance, Metric, MetricError, MetricRegistry, OptimalRmsd,
    SimpleRmsd,
};
pub use self::periodicity::{ArgumentSpec, Periodicity};
