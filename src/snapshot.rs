use std::collections::{BTreeMap, VecDeque};
use std::time::Instant;

use chrono::{DateTime, Local};

use crate::field::Field;
use crate::parser::TelemetryFrame;

/// Latest value seen for every field. Frames are merged, so a field keeps
/// its last value until a newer frame carries it again.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    values: BTreeMap<Field, f64>,
    last_update: Option<DateTime<Local>>,
    frames: u64,
    unmatched: u64,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&mut self, frame: &TelemetryFrame) {
        self.values.extend(frame.iter());
        self.last_update = Some(frame.time);
        self.frames += 1;
    }

    pub fn note_unmatched(&mut self) {
        self.unmatched += 1;
    }

    pub fn get(&self, field: Field) -> Option<f64> {
        self.values.get(&field).copied()
    }

    /// Label text for a field, `--` until a value arrives.
    pub fn display_value(&self, field: Field) -> String {
        match self.get(field) {
            Some(v) => match field.unit() {
                Some(unit) => format!("{v:.2} {unit}"),
                None => format!("{v}"),
            },
            None => "--".to_string(),
        }
    }

    pub fn last_update(&self) -> Option<DateTime<Local>> {
        self.last_update
    }

    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    pub fn unmatched_count(&self) -> u64 {
        self.unmatched
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Bounded per-field time series for plotting.
pub struct History {
    series: BTreeMap<Field, VecDeque<[f64; 2]>>,
    capacity: usize,
    start_time: Instant,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        History {
            series: BTreeMap::new(),
            capacity: capacity.max(1),
            start_time: Instant::now(),
        }
    }

    pub fn push(&mut self, frame: &TelemetryFrame) {
        let t = self.start_time.elapsed().as_secs_f64();
        self.push_at(t, frame);
    }

    /// Record a frame at `t` seconds since the history started.
    pub fn push_at(&mut self, t: f64, frame: &TelemetryFrame) {
        for (field, value) in frame.iter() {
            let points = self
                .series
                .entry(field)
                .or_insert_with(|| VecDeque::with_capacity(self.capacity));
            if points.len() >= self.capacity {
                points.pop_front();
            }
            points.push_back([t, value]);
        }
    }

    pub fn points(&self, field: Field) -> Vec<[f64; 2]> {
        self.series
            .get(&field)
            .map(|p| p.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn fields(&self) -> impl Iterator<Item = Field> + '_ {
        self.series.keys().copied()
    }

    pub fn clear(&mut self) {
        self.series.clear();
        self.start_time = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(values: &[(Field, f64)]) -> TelemetryFrame {
        TelemetryFrame::new(values.iter().copied().collect())
    }

    #[test]
    fn merge_keeps_previous_fields() {
        let mut snap = Snapshot::new();
        assert_eq!(snap.display_value(Field::AvgAltitude), "--");

        snap.merge(&frame(&[(Field::AvgAltitude, 792.95), (Field::Vref, 3.3)]));
        snap.merge(&frame(&[(Field::AvgAltitude, 801.0)]));

        assert_eq!(snap.get(Field::AvgAltitude), Some(801.0));
        assert_eq!(snap.get(Field::Vref), Some(3.3));
        assert_eq!(snap.frame_count(), 2);
        assert!(snap.last_update().is_some());
    }

    #[test]
    fn display_values() {
        let mut snap = Snapshot::new();
        snap.merge(&frame(&[(Field::AvgAltitude, 792.951), (Field::RecoveryStatus, 1.0)]));

        assert_eq!(snap.display_value(Field::AvgAltitude), "792.95 m");
        assert_eq!(snap.display_value(Field::RecoveryStatus), "1");

        snap.clear();
        assert!(snap.is_empty());
        assert_eq!(snap.frame_count(), 0);
    }

    #[test]
    fn history_drops_oldest() {
        let mut history = History::new(3);
        for i in 0..5 {
            history.push_at(i as f64, &frame(&[(Field::Vout, i as f64 * 0.5)]));
        }

        assert_eq!(
            history.points(Field::Vout),
            vec![[2.0, 1.0], [3.0, 1.5], [4.0, 2.0]]
        );
        assert!(history.points(Field::Vref).is_empty());
        assert_eq!(history.fields().collect::<Vec<_>>(), vec![Field::Vout]);
    }
}
