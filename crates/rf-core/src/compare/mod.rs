//! Motor de comparación y tipos de resultado.

mod engine;
mod result;

pub use engine::{compare, CompareOptions, ComparisonEngine, FloatRule};
pub use result::{ArrayDiff, CommonEntry, ComparisonOverview, ComparisonResult, IndexVerdict, KeyVerdict, MetricDelta,
                 MetricsComparison, MetricsOverview, ObjectDiff, SoloEntry, SoloMetric, Verdict};
