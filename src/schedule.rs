use log::debug;

use crate::error::{ScanError, ScanResult};
use crate::geometry::GridShape;

/// Ordered snapshot timestamps in seconds, one per grid cell.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelinePlan {
    timestamps: Vec<f64>,
}

impl TimelinePlan {
    pub fn timestamps(&self) -> &[f64] {
        &self.timestamps
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn into_inner(self) -> Vec<f64> {
        self.timestamps
    }
}

/// Compute one snapshot time per grid cell.
///
/// The duration is split into `N + avoid_leading + avoid_ending` equal
/// intervals. The leading/ending interval is skipped when requested and each
/// snapshot sits at the midpoint of one of the remaining `N` intervals.
pub fn schedule(duration: f64, grid: GridShape, avoid_leading: bool, avoid_ending: bool) -> ScanResult<TimelinePlan> {
    if !duration.is_finite() || duration <= 0.0 {
        return Err(ScanError::InvalidDuration(duration));
    }

    let count = grid.count();
    let skipped_head = usize::from(avoid_leading);
    let intervals = count + skipped_head + usize::from(avoid_ending);

    let timestamps = midpoints(duration, intervals, skipped_head, count);
    if is_valid(&timestamps, duration) {
        debug!("scheduled {} snapshots over {:.3}s: {:?}", count, duration, timestamps);
        return Ok(TimelinePlan { timestamps });
    }

    // Usable span collapsed; spread evenly over the whole video instead
    let timestamps = midpoints(duration, count, 0, count);
    if is_valid(&timestamps, duration) {
        debug!("avoidance span collapsed, using full duration: {:?}", timestamps);
        return Ok(TimelinePlan { timestamps });
    }

    Err(ScanError::DegenerateTimeline { duration, count })
}

fn midpoints(duration: f64, intervals: usize, first: usize, count: usize) -> Vec<f64> {
    let step = duration / intervals as f64;
    (0..count)
        .map(|k| step * ((first + k) as f64 + 0.5))
        .collect()
}

fn is_valid(timestamps: &[f64], duration: f64) -> bool {
    timestamps.iter().all(|t| t.is_finite() && *t >= 0.0 && *t < duration)
        && timestamps.windows(2).all(|w| w[0] < w[1])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: u32, cols: u32) -> GridShape {
        GridShape::new(rows, cols).unwrap()
    }

    fn assert_well_formed(plan: &TimelinePlan, count: usize, duration: f64) {
        assert_eq!(plan.len(), count);
        for t in plan.timestamps() {
            assert!(*t >= 0.0 && *t < duration, "{} out of range", t);
        }
        for w in plan.timestamps().windows(2) {
            assert!(w[0] < w[1]);
        }
    }

    #[test]
    fn test_even_spacing_without_avoidance() {
        let plan = schedule(120.0, grid(2, 2), false, false).unwrap();
        assert_eq!(plan.timestamps(), &[15.0, 45.0, 75.0, 105.0]);
    }

    #[test]
    fn test_avoid_leading_skips_first_interval() {
        let duration = 100.0;
        let plan = schedule(duration, grid(2, 2), true, false).unwrap();
        assert_well_formed(&plan, 4, duration);
        assert!(plan.timestamps()[0] > duration / 5.0);
        // uniform spacing of duration / (N + 1)
        for w in plan.timestamps().windows(2) {
            assert!((w[1] - w[0] - 20.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_avoid_ending_skips_last_interval() {
        let duration = 100.0;
        let plan = schedule(duration, grid(2, 2), false, true).unwrap();
        assert_well_formed(&plan, 4, duration);
        assert!(*plan.timestamps().last().unwrap() < duration - duration / 5.0);
    }

    #[test]
    fn test_avoid_both() {
        let duration = 60.0;
        let plan = schedule(duration, grid(1, 4), true, true).unwrap();
        assert_well_formed(&plan, 4, duration);
        assert!(plan.timestamps()[0] > 10.0);
        assert!(plan.timestamps()[3] < 50.0);
    }

    #[test]
    fn test_many_cells_in_short_video() {
        let duration = 0.5;
        let plan = schedule(duration, grid(9, 6), true, true).unwrap();
        assert_well_formed(&plan, 54, duration);
    }

    #[test]
    fn test_well_formed_across_shapes() {
        for duration in [1.0, 7.3, 59.0, 3600.0, 86_400.5] {
            for (rows, cols) in [(1, 1), (1, 5), (3, 3), (4, 4), (6, 9)] {
                for (lead, end) in [(false, false), (true, false), (false, true), (true, true)] {
                    let plan = schedule(duration, grid(rows, cols), lead, end).unwrap();
                    assert_well_formed(&plan, (rows * cols) as usize, duration);
                }
            }
        }
    }

    #[test]
    fn test_rejects_non_positive_duration() {
        assert!(matches!(schedule(0.0, grid(2, 2), false, false), Err(ScanError::InvalidDuration(_))));
        assert!(matches!(schedule(-3.0, grid(2, 2), true, true), Err(ScanError::InvalidDuration(_))));
        assert!(schedule(f64::NAN, grid(2, 2), false, false).is_err());
    }

    #[test]
    fn test_single_cell_is_midpoint() {
        let plan = schedule(10.0, grid(1, 1), false, false).unwrap();
        assert_eq!(plan.timestamps(), &[5.0]);
    }
}
