//! In-memory tabular records for captured sessions. A [`SampleTable`] is
//! one timed capture of one measurement channel; a [`SessionAggregate`]
//! accumulates the captures of a clinical session and merges them into a
//! [`SessionTable`] carrying the full canonical column set.
//!
//! Merging is index-aligned: captures of different lengths are extended to
//! the longest one and the missing tail is marked as "no data" (NaN).
//! Nothing is resampled or interpolated.

use log::warn;

/// Name of the timestamp column, always first in [`COLUMNS`].
pub const TIMESTAMP: &str = "timestamp_s";

/// The canonical session columns, in the exact order they are persisted.
pub const COLUMNS: [&str; 9] = [
    "timestamp_s",
    "ROM Flexion/Extension_deg",
    "EMG(F/E)_mv",
    "ROM Ulnar/Radial Deviation_deg",
    "EMG(D)_mv",
    "ROM Pronation/Supination_deg",
    "EMG(PS)_mv",
    "Grip Force_Kg",
    "EMG(FP)_mv",
];

/// The four clinical exercises as (summary label, measurement column).
pub const EXERCISES: [(&str, &str); 4] = [
    ("Flexion/Extension", "ROM Flexion/Extension_deg"),
    ("Ulnar/Radial Deviation", "ROM Ulnar/Radial Deviation_deg"),
    ("Pronation/Supination", "ROM Pronation/Supination_deg"),
    ("Grip Force", "Grip Force_Kg"),
];

/// Each EMG channel paired with the ROM/force column recorded alongside it.
pub const EMG_PAIRS: [(&str, &str); 4] = [
    ("EMG(F/E)_mv", "ROM Flexion/Extension_deg"),
    ("EMG(D)_mv", "ROM Ulnar/Radial Deviation_deg"),
    ("EMG(PS)_mv", "ROM Pronation/Supination_deg"),
    ("EMG(FP)_mv", "Grip Force_Kg"),
];

/// Position of `name` in [`COLUMNS`], if it is a canonical column.
pub fn column_index(name: &str) -> Option<usize> {
    COLUMNS.iter().position(|c| *c == name)
}

/// One timed capture: elapsed-seconds/value pairs destined for a single
/// measurement column. A capture with zero samples is valid; it means the
/// device responded but produced no readings within the window.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleTable {
    channel: String,
    samples: Vec<(f64, f64)>,
}

impl SampleTable {
    /// A fresh, empty capture for `channel`.
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            samples: Vec::new(),
        }
    }

    /// Appends one sample taken `elapsed_s` seconds into the capture.
    pub fn push(&mut self, elapsed_s: f64, value: f64) {
        self.samples.push((elapsed_s, value));
    }

    /// The measurement column this capture populates.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// The recorded (elapsed-seconds, value) pairs, in capture order.
    pub fn samples(&self) -> &[(f64, f64)] {
        &self.samples
    }

    /// Number of recorded samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True when no sample was recorded.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// A merged session: all nine canonical columns, equal length, with NaN
/// marking every cell no capture populated.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionTable {
    columns: Vec<Vec<f64>>,
}

impl SessionTable {
    /// A zero-row table that still carries every canonical column.
    pub fn empty() -> Self {
        Self {
            columns: vec![Vec::new(); COLUMNS.len()],
        }
    }

    /// Number of rows (all columns share it).
    pub fn n_rows(&self) -> usize {
        self.columns[0].len()
    }

    /// The values of a canonical column, by name.
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        column_index(name).map(|idx| self.columns[idx].as_slice())
    }

    /// A single cell, by column name and row index.
    pub fn value(&self, name: &str, row: usize) -> Option<f64> {
        self.column(name).and_then(|col| col.get(row)).copied()
    }

    /// Iterates (column name, values) in canonical order.
    pub fn columns(&self) -> impl Iterator<Item = (&'static str, &[f64])> {
        COLUMNS
            .iter()
            .copied()
            .zip(self.columns.iter().map(Vec::as_slice))
    }

    fn extend_to(&mut self, len: usize) {
        for column in &mut self.columns {
            column.resize(len, f64::NAN);
        }
    }

    fn set_column(&mut self, idx: usize, values: &[f64]) {
        debug_assert!(values.len() <= self.n_rows());
        let column = &mut self.columns[idx];
        column[..values.len()].copy_from_slice(values);
    }
}

/// Accumulates the per-exercise captures of one session.
#[derive(Debug, Default)]
pub struct SessionAggregate {
    tables: Vec<SampleTable>,
}

impl SessionAggregate {
    /// An aggregate with no captures yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one completed capture.
    pub fn push(&mut self, table: SampleTable) {
        self.tables.push(table);
    }

    /// True when no capture has been recorded at all.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Number of captures recorded so far.
    pub fn captures(&self) -> usize {
        self.tables.len()
    }

    /// Drops all recorded captures.
    pub fn clear(&mut self) {
        self.tables.clear();
    }

    /// Merges the captures into one [`SessionTable`].
    ///
    /// Rows align by index: the result is as long as the longest capture
    /// and shorter captures trail off into NaN. Timestamps come from the
    /// first capture only. Captures aimed at a channel outside [`COLUMNS`]
    /// are dropped with a warning.
    pub fn merge(&self) -> SessionTable {
        let mut out = SessionTable::empty();

        for (i, table) in self.tables.iter().enumerate() {
            let target = out.n_rows().max(table.len());
            out.extend_to(target);

            if i == 0 {
                let timestamps: Vec<f64> =
                    table.samples().iter().map(|(t, _)| *t).collect();
                out.set_column(0, &timestamps);
            }

            match column_index(table.channel()) {
                Some(idx) if idx != 0 => {
                    let values: Vec<f64> =
                        table.samples().iter().map(|(_, v)| *v).collect();
                    out.set_column(idx, &values);
                }
                _ => warn!(
                    "discarding capture for unknown channel {:?}",
                    table.channel()
                ),
            }
        }

        out
    }
}

/// Session-wide EMG extremes and the concurrent value of the paired
/// ROM/force channel at the moment each extreme occurred.
#[derive(Debug, Clone, PartialEq)]
pub struct EmgExtremes {
    /// The largest EMG value across all EMG channels.
    pub max: f64,
    /// `"<paired column> = <value>"` at the row where the maximum occurred.
    pub max_moment: String,
    /// The smallest EMG value across all EMG channels.
    pub min: f64,
    /// `"<paired column> = <value>"` at the row where the minimum occurred.
    pub min_moment: String,
}

/// Scans all EMG columns jointly for the single global maximum and minimum.
/// Ties resolve to the earliest column (in [`EMG_PAIRS`] order), then the
/// earliest row. Returns `None` when no EMG channel holds any data.
pub fn emg_extremes(table: &SessionTable) -> Option<EmgExtremes> {
    let mut max: Option<(f64, usize, &str)> = None;
    let mut min: Option<(f64, usize, &str)> = None;

    for (emg_col, paired_col) in EMG_PAIRS {
        let values = table.column(emg_col)?;
        for (row, value) in values.iter().enumerate() {
            if value.is_nan() {
                continue;
            }
            if max.map_or(true, |(m, _, _)| *value > m) {
                max = Some((*value, row, paired_col));
            }
            if min.map_or(true, |(m, _, _)| *value < m) {
                min = Some((*value, row, paired_col));
            }
        }
    }

    match (max, min) {
        (Some((max, max_row, max_col)), Some((min, min_row, min_col))) => Some(EmgExtremes {
            max,
            max_moment: moment(table, max_col, max_row),
            min,
            min_moment: moment(table, min_col, min_row),
        }),
        _ => None,
    }
}

fn moment(table: &SessionTable, column: &str, row: usize) -> String {
    let value = table.value(column, row).unwrap_or(f64::NAN);
    format!("{} = {}", column, value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capture(channel: &str, values: &[f64]) -> SampleTable {
        let mut table = SampleTable::new(channel);
        for (i, v) in values.iter().enumerate() {
            table.push(i as f64 * 0.1, *v);
        }
        table
    }

    #[test]
    fn empty_aggregate_keeps_canonical_columns() {
        let merged = SessionAggregate::new().merge();
        assert_eq!(merged.n_rows(), 0);
        let names: Vec<&str> = merged.columns().map(|(name, _)| name).collect();
        assert_eq!(names, COLUMNS);
    }

    #[test]
    fn shorter_capture_trails_into_nan() {
        let mut agg = SessionAggregate::new();
        agg.push(capture("ROM Flexion/Extension_deg", &[1.0, 2.0, 3.0, 4.0, 5.0]));
        agg.push(capture(
            "ROM Ulnar/Radial Deviation_deg",
            &[9.0, 8.0, 7.0, 6.0, 5.0, 4.0, 3.0, 2.0],
        ));
        let merged = agg.merge();

        assert_eq!(merged.n_rows(), 8);
        let flex = merged.column("ROM Flexion/Extension_deg").unwrap();
        assert_eq!(&flex[..5], &[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert!(flex[5..].iter().all(|v| v.is_nan()));
        let dev = merged.column("ROM Ulnar/Radial Deviation_deg").unwrap();
        assert_eq!(dev, &[9.0, 8.0, 7.0, 6.0, 5.0, 4.0, 3.0, 2.0]);
    }

    #[test]
    fn timestamps_come_from_first_capture() {
        let mut agg = SessionAggregate::new();
        agg.push(capture("ROM Flexion/Extension_deg", &[1.0; 10]));
        agg.push(capture("ROM Ulnar/Radial Deviation_deg", &[2.0; 12]));
        let merged = agg.merge();

        assert_eq!(merged.n_rows(), 12);
        let ts = merged.column(TIMESTAMP).unwrap();
        assert!((ts[9] - 0.9).abs() < 1e-12);
        assert!(ts[10].is_nan() && ts[11].is_nan());
        // the shorter capture's column gets two trailing no-data rows
        let flex = merged.column("ROM Flexion/Extension_deg").unwrap();
        assert!(flex[..10].iter().all(|v| *v == 1.0));
        assert!(flex[10..].iter().all(|v| v.is_nan()));
        // the untouched columns are all NaN
        let emg = merged.column("EMG(F/E)_mv").unwrap();
        assert!(emg.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn unknown_channel_is_dropped() {
        let mut agg = SessionAggregate::new();
        agg.push(capture("ROM Flexion/Extension_deg", &[1.0, 2.0]));
        agg.push(capture("Humidity_%", &[55.0, 54.0, 53.0]));
        let merged = agg.merge();

        // the rogue capture still stretches the row count, but none of its
        // values land anywhere
        assert_eq!(merged.n_rows(), 3);
        for (name, values) in merged.columns() {
            if name == "ROM Flexion/Extension_deg" || name == TIMESTAMP {
                continue;
            }
            assert!(values.iter().all(|v| v.is_nan()), "column {name}");
        }
    }

    #[test]
    fn emg_extremes_report_the_paired_moment() {
        let mut agg = SessionAggregate::new();
        agg.push(capture("ROM Ulnar/Radial Deviation_deg", &[10.0, 11.0, 12.0, 12.5]));
        agg.push(capture("EMG(D)_mv", &[0.4, 0.2, 0.9, 1.8]));
        let merged = agg.merge();

        let extremes = emg_extremes(&merged).unwrap();
        assert_eq!(extremes.max, 1.8);
        assert_eq!(extremes.max_moment, "ROM Ulnar/Radial Deviation_deg = 12.5");
        assert_eq!(extremes.min, 0.2);
        assert_eq!(extremes.min_moment, "ROM Ulnar/Radial Deviation_deg = 11");
    }

    #[test]
    fn emg_extremes_without_emg_data() {
        let mut agg = SessionAggregate::new();
        agg.push(capture("ROM Flexion/Extension_deg", &[1.0, 2.0]));
        assert_eq!(emg_extremes(&agg.merge()), None);
    }

    #[test]
    fn tie_resolves_to_earliest_row() {
        let mut agg = SessionAggregate::new();
        agg.push(capture("Grip Force_Kg", &[20.0, 25.0, 30.0]));
        agg.push(capture("EMG(FP)_mv", &[2.0, 2.0, 1.0]));
        let merged = agg.merge();

        let extremes = emg_extremes(&merged).unwrap();
        assert_eq!(extremes.max_moment, "Grip Force_Kg = 20");
    }
}
