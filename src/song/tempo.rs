/// Default tempo when a file declares none (120 BPM).
const DEFAULT_BPM: f64 = 120.0;

/// Piecewise-linear tick → seconds mapping built from a file's tempo events.
///
/// Each segment is `(start_tick, seconds_per_tick, start_seconds)`. Ticks past the last
/// segment extrapolate with the final tempo, so any tick can be converted.
#[derive(Debug, Clone, PartialEq)]
pub struct TickMap {
    segments: Vec<(u64, f64, f64)>,
}

impl TickMap {
    /// Build the mapping from `(tick, microseconds_per_beat)` tempo events in file order.
    ///
    /// A tempo event on tick 0 replaces the default tempo. Later events only open a new
    /// segment when they actually change the tick scale.
    pub fn new(resolution: u16, tempo_events: &[(u64, u32)]) -> Self {
        let resolution = resolution.max(1) as f64;
        let mut scales: Vec<(u64, f64)> = vec![(0, 60.0 / (DEFAULT_BPM * resolution))];

        for &(tick, usec_per_beat) in tempo_events {
            let bpm = 6e7 / usec_per_beat.max(1) as f64;
            let scale = 60.0 / (bpm * resolution);
            if tick == 0 {
                scales = vec![(0, scale)];
            } else if let Some(&(_, last_scale)) = scales.last() {
                if scale != last_scale {
                    scales.push((tick, scale));
                }
            }
        }
        scales.sort_by_key(|&(tick, _)| tick);

        let mut segments = Vec::with_capacity(scales.len());
        let mut elapsed = 0.0;
        let mut prev: Option<(u64, f64)> = None;
        for (tick, scale) in scales {
            if let Some((prev_tick, prev_scale)) = prev {
                elapsed += (tick - prev_tick) as f64 * prev_scale;
            }
            segments.push((tick, scale, elapsed));
            prev = Some((tick, scale));
        }

        Self { segments }
    }

    /// Convert an absolute tick to seconds.
    pub fn tick_to_time(&self, tick: u64) -> f64 {
        let idx = self.segments.partition_point(|&(start, _, _)| start <= tick);
        match idx.checked_sub(1).and_then(|i| self.segments.get(i)) {
            Some(&(start, scale, offset)) => offset + (tick - start) as f64 * scale,
            None => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tempo() {
        // 120 BPM at 480 tpq: one beat = 0.5s
        let map = TickMap::new(480, &[]);
        assert!((map.tick_to_time(480) - 0.5).abs() < 1e-12);
        assert_eq!(map.tick_to_time(0), 0.0);
    }

    #[test]
    fn test_tempo_at_zero_replaces_default() {
        // 60 BPM
        let map = TickMap::new(100, &[(0, 1_000_000)]);
        assert!((map.tick_to_time(100) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_tempo_change_midway() {
        // 120 BPM for the first beat, then 60 BPM
        let map = TickMap::new(100, &[(0, 500_000), (100, 1_000_000)]);
        assert!((map.tick_to_time(100) - 0.5).abs() < 1e-12);
        assert!((map.tick_to_time(200) - 1.5).abs() < 1e-12);
        // extrapolates with the final tempo
        assert!((map.tick_to_time(1_000) - 9.5).abs() < 1e-9);
    }

    #[test]
    fn test_repeated_tempo_ignored() {
        let map = TickMap::new(480, &[(0, 500_000), (960, 500_000), (1920, 500_000)]);
        assert_eq!(map, TickMap::new(480, &[]));
    }

    #[test]
    fn test_monotonic() {
        let map = TickMap::new(96, &[(0, 400_000), (300, 900_000), (700, 250_000)]);
        let mut last = -1.0;
        for tick in (0..2_000).step_by(7) {
            let t = map.tick_to_time(tick);
            assert!(t > last);
            last = t;
        }
    }
}
