//! The newline-delimited command protocol used when an external host
//! process (a GUI, a supervisor, a test) drives the capture core instead
//! of a built-in interface. Requests come in on one line each; every
//! request gets at least one response line, and captures additionally
//! stream `DATA:` lines in real time.
//!
//! ```text
//! > PATIENT:12.345-678
//! < STATUS:PATIENT_SET:12345678
//! > START:1:ROM Flexion/Extension_deg:10
//! < STATUS:CAPTURE_STARTED:ROM Flexion/Extension_deg
//! < DATA:ROM Flexion/Extension_deg,0.102,14.250000
//! < ...
//! < STATUS:CAPTURE_END:ROM Flexion/Extension_deg
//! > SAVE
//! < SAVED:PacienteData/12345678/Lecturas.xlsx
//! ```

use crate::capture::{acquire, CaptureError, CaptureEvent, ProtocolTiming};
use crate::csv_io;
use crate::sample_table::SampleTable;
use crate::session::{SessionError, SessionState};
use crate::transport::Connector;
use crate::workbook::StoreError;

use chrono::Local;
use log::{info, warn};
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

/// Whether the bridge should keep serving after a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep reading requests.
    Continue,
    /// The host asked to exit.
    Exit,
}

/// Serves the command protocol over any line-oriented reader/writer pair,
/// holding the session state between requests. Captures run blocking on
/// the caller's thread, exactly one at a time, which is also what keeps
/// the serial port single-user.
pub struct Bridge<C: Connector> {
    connector: C,
    timing: ProtocolTiming,
    data_dir: PathBuf,
    workbook_name: String,
    csv_dir: Option<PathBuf>,
    session: SessionState,
}

impl<C: Connector> Bridge<C> {
    /// A bridge that captures through `connector` and saves workbooks
    /// under `data_dir`.
    pub fn new(
        connector: C,
        timing: ProtocolTiming,
        data_dir: impl Into<PathBuf>,
        workbook_name: impl Into<String>,
    ) -> Self {
        Self {
            connector,
            timing,
            data_dir: data_dir.into(),
            workbook_name: workbook_name.into(),
            csv_dir: None,
            session: SessionState::new(),
        }
    }

    /// Additionally archives every completed capture as a CSV file in
    /// `dir` (the per-exercise archive the Qt front end kept).
    pub fn with_csv_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.csv_dir = Some(dir.into());
        self
    }

    /// Announces readiness, then serves requests until EOF or `EXIT`.
    pub fn run(&mut self, input: impl BufRead, mut output: impl Write) -> io::Result<()> {
        writeln!(output, "STATUS:READY")?;
        output.flush()?;

        for line in input.lines() {
            let line = line?;
            let flow = self.handle_line(line.trim(), &mut output)?;
            output.flush()?;
            if flow == Flow::Exit {
                break;
            }
        }
        Ok(())
    }

    /// Handles one request line and writes the response(s) to `out`.
    pub fn handle_line(&mut self, line: &str, out: &mut impl Write) -> io::Result<Flow> {
        if line.is_empty() {
            return Ok(Flow::Continue);
        }

        if let Some(raw) = strip_prefix_ci(line, "PATIENT:") {
            match self.session.set_patient(raw) {
                Ok(id) => writeln!(out, "STATUS:PATIENT_SET:{id}")?,
                Err(e) => {
                    warn!("rejected patient id: {e}");
                    writeln!(out, "ERROR:PATIENT_FORMAT")?;
                }
            }
            return Ok(Flow::Continue);
        }

        if let Some(rest) = strip_prefix_ci(line, "START:") {
            self.handle_start(rest, out)?;
            return Ok(Flow::Continue);
        }

        if line.eq_ignore_ascii_case("SAVE") {
            self.handle_save(out)?;
            return Ok(Flow::Continue);
        }

        if line.eq_ignore_ascii_case("STATUS") {
            writeln!(out, "STATUS:READY")?;
            return Ok(Flow::Continue);
        }

        if line.eq_ignore_ascii_case("EXIT") {
            writeln!(out, "STATUS:EXITING")?;
            return Ok(Flow::Exit);
        }

        writeln!(out, "ERROR:UNKNOWN_CMD:{line}")?;
        Ok(Flow::Continue)
    }

    /// `START:<cmd>:<colname>:<durationSeconds>` — one blocking capture.
    fn handle_start(&mut self, rest: &str, out: &mut impl Write) -> io::Result<Flow> {
        let mut parts = rest.splitn(3, ':');
        let (command, channel, duration) = match (parts.next(), parts.next(), parts.next()) {
            (Some(cmd), Some(channel), Some(duration))
                if !cmd.is_empty() && !channel.is_empty() =>
            {
                (cmd, channel, duration)
            }
            _ => {
                writeln!(out, "ERROR:START_FORMAT")?;
                return Ok(Flow::Continue);
            }
        };
        let duration_s = match duration.trim().parse::<i64>() {
            Ok(d) if d > 0 => d as u64,
            _ => {
                writeln!(out, "ERROR:DURATION")?;
                return Ok(Flow::Continue);
            }
        };

        writeln!(out, "STATUS:CAPTURE_STARTED:{channel}")?;
        out.flush()?;

        let result = acquire(
            &self.connector,
            &self.timing,
            command,
            channel,
            duration_s,
            // losing a progress line must not kill the capture, so write
            // errors inside the window are dropped
            &mut |event| match event {
                CaptureEvent::Sample { elapsed_s, value } => {
                    let _ = writeln!(out, "DATA:{channel},{elapsed_s:.3},{value:.6}");
                    let _ = out.flush();
                }
                CaptureEvent::Diagnostic(text) => {
                    let _ = writeln!(out, "HWMSG:{text}");
                    let _ = out.flush();
                }
            },
        );

        match result {
            Ok(table) => {
                writeln!(out, "STATUS:CAPTURE_END:{channel}")?;
                self.archive_capture(command, &table);
                self.session.record(table);
            }
            Err(CaptureError::InvalidDuration(_)) => writeln!(out, "ERROR:DURATION")?,
            Err(CaptureError::Connect(e)) => writeln!(out, "ERROR:SERIAL_OPEN:{e}")?,
            Err(CaptureError::Transport(e)) => writeln!(out, "ERROR:SERIAL_IO:{e}")?,
        }
        Ok(Flow::Continue)
    }

    fn handle_save(&mut self, out: &mut impl Write) -> io::Result<()> {
        match self
            .session
            .save(&self.data_dir, &self.workbook_name, Local::now())
        {
            Ok(saved) => {
                info!("session saved to {}", saved.path.display());
                writeln!(out, "SAVED:{}", saved.path.display())
            }
            Err(SessionError::NoPatient) => writeln!(out, "ERROR:NO_PATIENT"),
            Err(SessionError::NoData) => writeln!(out, "ERROR:NO_DATA"),
            Err(SessionError::Store(StoreError::Locked(_))) => {
                writeln!(out, "ERROR:EXCEL_LOCKED")
            }
            Err(e) => writeln!(out, "ERROR:SAVE_FAILED:{e}"),
        }
    }

    /// Best effort: a failed archive write is logged, never fatal.
    fn archive_capture(&self, command: &str, table: &SampleTable) {
        let Some(dir) = &self.csv_dir else {
            return;
        };
        if table.is_empty() {
            return;
        }
        let archive = (|| -> io::Result<PathBuf> {
            fs::create_dir_all(dir)?;
            let path = dir.join(csv_io::capture_file_name(&Local::now(), command));
            csv_io::write_capture_csv(&path, table)?;
            Ok(path)
        })();
        match archive {
            Ok(path) => info!("capture archived to {}", path.display()),
            Err(e) => warn!("could not archive capture: {e}"),
        }
    }
}

/// Case-insensitive ASCII prefix strip; the protocol keywords are ASCII.
fn strip_prefix_ci<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    if line.len() >= prefix.len()
        && line.is_char_boundary(prefix.len())
        && line[..prefix.len()].eq_ignore_ascii_case(prefix)
    {
        Some(&line[prefix.len()..])
    } else {
        None
    }
}
