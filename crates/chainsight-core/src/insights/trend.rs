//! Delayed/on-time trend series

use crate::models::TrendPoint;

/// Placeholder history shown ahead of the live bucket
///
/// Real week-over-week history belongs to the data pipeline that feeds the
/// service; until one exists these three weeks stand in for it.
pub fn default_trend_baseline() -> Vec<TrendPoint> {
    vec![
        TrendPoint::new("Week 1", 5, 45),
        TrendPoint::new("Week 2", 8, 42),
        TrendPoint::new("Week 3", 6, 44),
    ]
}

/// Baseline followed by one bucket for the current batch
pub fn build_trends(baseline: &[TrendPoint], delayed: usize, on_time: usize) -> Vec<TrendPoint> {
    let mut trends = Vec::with_capacity(baseline.len() + 1);
    trends.extend_from_slice(baseline);
    trends.push(TrendPoint::new(
        format!("Week {}", baseline.len() + 1),
        delayed,
        on_time,
    ));
    trends
}
