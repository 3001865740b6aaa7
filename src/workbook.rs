//! Durable per-patient persistence. Each patient owns one workbook file
//! with a fixed-structure summary sheet ("Inicio") and one uniquely named
//! sheet per saved session. The store only ever adds: existing sheets are
//! never rewritten or removed.
//!
//! The workbook is loaded, fully updated in memory and written back in one
//! logical operation. A file held open exclusively elsewhere (Excel, most
//! of the time) surfaces as [`StoreError::Locked`] so the operator can be
//! told to close it and retry.

use crate::sample_table::{emg_extremes, SessionTable, COLUMNS, EXERCISES};

use chrono::{DateTime, Local, NaiveDate};
use log::debug;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use umya_spreadsheet::structs::{Table, TableColumn, TableStyleInfo};
use umya_spreadsheet::{reader, writer, Spreadsheet, XlsxError};

/// Name of the summary sheet.
pub const SUMMARY_SHEET: &str = "Inicio";

/// Why a store operation failed.
#[derive(Debug)]
pub enum StoreError {
    /// The workbook file is held open exclusively by another process.
    /// Retrying after the operator closes it is expected to succeed.
    Locked(PathBuf),
    /// A filesystem error outside the workbook format itself.
    Io(io::Error),
    /// The workbook could not be read or written.
    Workbook(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StoreError::Locked(path) => write!(
                f,
                "workbook {} is open in another program; close it and retry",
                path.display()
            ),
            StoreError::Io(e) => write!(f, "io error: {e}"),
            StoreError::Workbook(msg) => write!(f, "workbook error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// A patient workbook, held in memory between [`WorkbookStore::open_or_create`]
/// and [`WorkbookStore::save`].
pub struct WorkbookStore {
    book: Spreadsheet,
    path: PathBuf,
}

impl WorkbookStore {
    /// Loads the workbook at `path`, creating (and immediately persisting)
    /// an empty one when the file does not exist yet. Parent directories
    /// are created as needed.
    pub fn open_or_create(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(StoreError::Io)?;
        }

        let book = if path.exists() {
            reader::xlsx::read(&path).map_err(|e| classify(&path, e))?
        } else {
            debug!("creating new workbook at {}", path.display());
            let book = umya_spreadsheet::new_file();
            writer::xlsx::write(&book, &path).map_err(|e| classify(&path, e))?;
            book
        };

        Ok(Self { book, path })
    }

    /// Where this workbook lives on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Names of all sheets, in workbook order.
    pub fn sheet_names(&self) -> Vec<String> {
        self.book
            .get_sheet_collection()
            .iter()
            .map(|sheet| sheet.get_name().to_string())
            .collect()
    }

    /// Creates the "Inicio" summary sheet if it is missing: a title, the
    /// per-exercise block headers in A3:D3 and the global-EMG block
    /// headers in G2:K3. An existing summary sheet is left untouched, so
    /// calling this on every save is safe.
    pub fn ensure_summary_sheet(&mut self) {
        if self.book.get_sheet_by_name(SUMMARY_SHEET).is_some() {
            return;
        }
        let sheet = match self.book.new_sheet(SUMMARY_SHEET) {
            Ok(sheet) => sheet,
            // only fails on a duplicate name, which we just ruled out
            Err(_) => return,
        };

        sheet.get_cell_mut("A1").set_value("Dashboard - Summary");
        sheet
            .get_style_mut("A1")
            .get_font_mut()
            .set_bold(true)
            .set_size(14.0);

        for (cell, text) in [("A3", "Date"), ("B3", "Exercise"), ("C3", "Min"), ("D3", "Max")] {
            sheet.get_cell_mut(cell).set_value(text);
        }

        sheet
            .get_cell_mut("G2")
            .set_value("Global EMG summary (per session)");
        sheet.get_style_mut("G2").get_font_mut().set_bold(true);
        for (cell, text) in [
            ("G3", "Date"),
            ("H3", "EMG max"),
            ("I3", "Moment of EMG max"),
            ("J3", "EMG min"),
            ("K3", "Moment of EMG min"),
        ] {
            sheet.get_cell_mut(cell).set_value(text);
            sheet.get_style_mut(cell).get_font_mut().set_bold(true);
        }
    }

    /// Appends a new sheet holding `table` (header row plus one row per
    /// sample, missing values as empty cells), wrapped in a named
    /// structured table for downstream spreadsheet tooling. Returns the
    /// sheet name actually used; collisions resolve by truncating the base
    /// to 28 characters and suffixing `_2`, `_3`, ... until unique.
    pub fn write_session(
        &mut self,
        base_sheet_name: &str,
        table: &SessionTable,
        table_name: &str,
    ) -> Result<String, StoreError> {
        let sheet_name = self.unique_sheet_name(base_sheet_name);
        let sheet = self
            .book
            .new_sheet(sheet_name.as_str())
            .map_err(|e| StoreError::Workbook(e.to_string()))?;

        for (col_idx, (name, values)) in table.columns().enumerate() {
            let col = (col_idx + 1) as u32;
            sheet.get_cell_mut((col, 1)).set_value(name);
            for (row_idx, value) in values.iter().enumerate() {
                if value.is_nan() {
                    continue;
                }
                sheet
                    .get_cell_mut((col, (row_idx + 2) as u32))
                    .set_value_number(*value);
            }
        }

        let mut table_def = Table::default();
        table_def.set_name(table_name);
        table_def.set_display_name(table_name);
        table_def.set_area((
            (1, 1),
            (COLUMNS.len() as u32, (table.n_rows() + 1) as u32),
        ));
        for name in COLUMNS {
            let mut column = TableColumn::default();
            column.set_name(name.to_string());
            table_def.add_column(column);
        }
        let style = TableStyleInfo::new("TableStyleMedium9", false, false, true, false);
        table_def.set_style_info(Some(style));
        sheet.add_table(table_def);

        Ok(sheet_name)
    }

    /// Appends this session's rows to the two summary blocks: one
    /// date/label/min/max row per exercise that actually holds data
    /// (columns A-D), and one global-EMG extremum row (columns G-K). The
    /// EMG row is skipped entirely when no EMG channel has data.
    pub fn append_summary(&mut self, date: NaiveDate, table: &SessionTable) {
        self.ensure_summary_sheet();
        let sheet = match self.book.get_sheet_by_name_mut(SUMMARY_SHEET) {
            Some(sheet) => sheet,
            None => return,
        };
        let date_text = date.format("%Y-%m-%d").to_string();

        let mut row = 4u32;
        while !sheet.get_value((1, row)).is_empty() {
            row += 1;
        }
        for (label, column) in EXERCISES {
            let values = match table.column(column) {
                Some(values) => values,
                None => continue,
            };
            let mut finite = values.iter().copied().filter(|v| !v.is_nan()).peekable();
            if finite.peek().is_none() {
                continue;
            }
            let (min, max) = finite.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });

            sheet.get_cell_mut((1, row)).set_value(date_text.as_str());
            sheet.get_cell_mut((2, row)).set_value(label);
            sheet.get_cell_mut((3, row)).set_value_number(min);
            sheet.get_cell_mut((4, row)).set_value_number(max);
            row += 1;
        }

        let mut row_g = 4u32;
        while !sheet.get_value((7, row_g)).is_empty() {
            row_g += 1;
        }
        if let Some(extremes) = emg_extremes(table) {
            sheet.get_cell_mut((7, row_g)).set_value(date_text.as_str());
            sheet.get_cell_mut((8, row_g)).set_value_number(extremes.max);
            sheet
                .get_cell_mut((9, row_g))
                .set_value(extremes.max_moment.as_str());
            sheet.get_cell_mut((10, row_g)).set_value_number(extremes.min);
            sheet
                .get_cell_mut((11, row_g))
                .set_value(extremes.min_moment.as_str());
        }
    }

    /// Writes the workbook back to disk.
    pub fn save(&self) -> Result<(), StoreError> {
        writer::xlsx::write(&self.book, &self.path).map_err(|e| classify(&self.path, e))
    }

    fn unique_sheet_name(&self, base: &str) -> String {
        let mut name = truncate_chars(base, 31);
        if self.book.get_sheet_by_name(&name).is_none() {
            return name;
        }
        let stem = truncate_chars(base, 28);
        let mut i = 2;
        loop {
            name = truncate_chars(&format!("{stem}_{i}"), 31);
            if self.book.get_sheet_by_name(&name).is_none() {
                return name;
            }
            i += 1;
        }
    }
}

/// Sheet and structured-table names for a session saved at `when`:
/// `sesion_YYYY-MM-DD_HH-MM-SS` and `TablaDatos_HHMMSS`, both clamped to
/// the 31-character workbook limits. These formats are what every
/// previously saved workbook already contains, so they stay as they are.
pub fn session_names(when: &DateTime<Local>) -> (String, String) {
    let sheet = truncate_chars(&format!("sesion_{}", when.format("%Y-%m-%d_%H-%M-%S")), 31);
    let table: String = format!("TablaDatos_{}", when.format("%H%M%S"))
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .take(31)
        .collect();
    (sheet, table)
}

fn truncate_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

/// An exclusively held file surfaces as a permission error; everything
/// else is a plain workbook failure.
fn classify(path: &Path, err: XlsxError) -> StoreError {
    match err {
        XlsxError::Io(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            StoreError::Locked(path.to_path_buf())
        }
        other => StoreError::Workbook(other.to_string()),
    }
}
