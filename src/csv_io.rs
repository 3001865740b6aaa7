//! Per-exercise CSV archives. A capture file holds a `timestamp_s` column
//! plus one or two data columns (a ROM/force channel, optionally with the
//! EMG channel recorded alongside it). These files are both an archive of
//! individual exercises and the input to the `from-csv` workbook builder.

use crate::sample_table::{SampleTable, TIMESTAMP};

use chrono::{DateTime, Local};
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Why a capture CSV could not be read.
#[derive(Debug)]
pub enum CsvError {
    /// The file could not be opened or read.
    Io(io::Error),
    /// The file has no header line at all.
    Empty,
    /// The header is not `timestamp_s,<channel>[,<channel>...]`.
    Header(String),
    /// A data cell failed to parse as a number.
    Value {
        /// 1-based line number of the offending row.
        line: usize,
        /// The cell content that failed to parse.
        field: String,
    },
}

impl fmt::Display for CsvError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CsvError::Io(e) => write!(f, "io error: {e}"),
            CsvError::Empty => write!(f, "capture csv is empty"),
            CsvError::Header(header) => {
                write!(f, "capture csv must start with {TIMESTAMP:?}, got {header:?}")
            }
            CsvError::Value { line, field } => {
                write!(f, "line {line}: {field:?} is not a number")
            }
        }
    }
}

impl std::error::Error for CsvError {}

impl From<io::Error> for CsvError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

/// Writes one capture as CSV: a header row and one `timestamp,value` row
/// per sample, four decimal places, missing values as empty fields.
pub fn write_capture_csv(path: &Path, table: &SampleTable) -> io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "{},{}", TIMESTAMP, table.channel())?;
    for (elapsed_s, value) in table.samples() {
        if value.is_nan() {
            writeln!(out, "{elapsed_s:.4},")?;
        } else {
            writeln!(out, "{elapsed_s:.4},{value:.4}")?;
        }
    }
    out.flush()
}

/// Reads a capture CSV back as one [`SampleTable`] per data column. All
/// tables share the file's timestamps, so aggregating them keeps the rows
/// aligned. Empty cells and `NaN` read back as missing values.
pub fn read_capture_csv(path: &Path) -> Result<Vec<SampleTable>, CsvError> {
    let reader = BufReader::new(File::open(path)?);
    let mut lines = reader.lines();

    let header = lines.next().ok_or(CsvError::Empty)??;
    let header = header.trim_start_matches('\u{feff}').trim();
    let fields: Vec<&str> = header.split(',').map(str::trim).collect();
    if fields.len() < 2 || fields[0] != TIMESTAMP {
        return Err(CsvError::Header(header.to_string()));
    }
    let mut tables: Vec<SampleTable> =
        fields[1..].iter().map(|name| SampleTable::new(*name)).collect();

    for (idx, line) in lines.enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let line_no = idx + 2;
        let cells: Vec<&str> = line.split(',').map(str::trim).collect();
        let elapsed_s = parse_cell(cells[0], line_no)?.ok_or_else(|| CsvError::Value {
            line: line_no,
            field: cells[0].to_string(),
        })?;

        for (col, table) in tables.iter_mut().enumerate() {
            let raw = cells.get(col + 1).copied().unwrap_or("");
            let value = parse_cell(raw, line_no)?.unwrap_or(f64::NAN);
            table.push(elapsed_s, value);
        }
    }

    Ok(tables)
}

/// Empty cells and literal NaN mean "no data"; anything else must parse.
fn parse_cell(raw: &str, line: usize) -> Result<Option<f64>, CsvError> {
    if raw.is_empty() || raw.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    raw.parse::<f64>().map(Some).map_err(|_| CsvError::Value {
        line,
        field: raw.to_string(),
    })
}

/// File name for a capture archived at `when`, running device command
/// `command`: `YYYY-MM-DD_HH-MM-SS_Ej<command>.csv`.
pub fn capture_file_name(when: &DateTime<Local>, command: &str) -> String {
    format!("{}_Ej{}.csv", when.format("%Y-%m-%d_%H-%M-%S"), command)
}
