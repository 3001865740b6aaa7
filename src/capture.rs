//! One bounded acquisition against the sensor device: open the transport,
//! start the requested exercise, tare, collect timestamped readings for a
//! fixed number of seconds, then stop and release the port. The transport
//! is dropped on every exit path, so the device is never left held open.

use crate::reading_decoder::first_reading;
use crate::sample_table::SampleTable;
use crate::transport::{Connector, Transport};

use log::{debug, warn};
use std::fmt;
use std::io;
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Byte that zeroes the ROM reference once an exercise is running.
pub const TARE_COMMAND: &[u8] = b" ";

/// Byte that tells the firmware to stop streaming.
pub const STOP_COMMAND: &[u8] = b"e";

/// Delays the capture protocol leaves for the device to settle.
#[derive(Debug, Clone, Copy)]
pub struct ProtocolTiming {
    /// Pause after opening the port, while the board resets.
    pub settle: Duration,
    /// Pause after each command byte before the next write.
    pub command_gap: Duration,
}

/// Something that happened during a capture, reported as it happens so a
/// host can show readings in real time.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    /// One reading was recorded.
    Sample {
        /// Seconds since the acquisition window opened.
        elapsed_s: f64,
        /// The decoded value.
        value: f64,
    },
    /// The device emitted a line with no numeral in it.
    Diagnostic(String),
}

/// Why an acquisition failed. Zero recorded samples is *not* a failure;
/// it yields an empty table.
#[derive(Debug)]
pub enum CaptureError {
    /// The requested duration was not a positive number of seconds.
    /// Reported before any transport is touched.
    InvalidDuration(u64),
    /// The transport could not be opened.
    Connect(io::Error),
    /// The transport failed fatally mid-capture.
    Transport(io::Error),
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CaptureError::InvalidDuration(d) => {
                write!(f, "capture duration must be positive, got {d} s")
            }
            CaptureError::Connect(e) => write!(f, "could not open device port: {e}"),
            CaptureError::Transport(e) => write!(f, "device i/o failed: {e}"),
        }
    }
}

impl std::error::Error for CaptureError {}

/// Runs one acquisition: `command` selects the exercise on the firmware,
/// `channel` names the measurement column the readings belong to, and the
/// loop runs for `duration_s` wall-clock seconds. Every recorded sample
/// and every diagnostic line is also pushed through `on_event`.
///
/// Lines without a numeral are diagnostics, not errors; read timeouts just
/// mean the device had nothing to say this iteration. Only transport-level
/// failures abort the capture.
pub fn acquire<C: Connector>(
    connector: &C,
    timing: &ProtocolTiming,
    command: &str,
    channel: &str,
    duration_s: u64,
    on_event: &mut dyn FnMut(CaptureEvent),
) -> Result<SampleTable, CaptureError> {
    if duration_s == 0 {
        return Err(CaptureError::InvalidDuration(duration_s));
    }

    let mut link = connector.connect().map_err(CaptureError::Connect)?;
    spin_sleep::sleep(timing.settle);

    let mut table = SampleTable::new(channel);
    let result = run_window(&mut link, timing, command, duration_s, &mut table, on_event);

    // Halt the stream even after an I/O failure; the port itself is
    // released when `link` drops, whatever happened above.
    if let Err(e) = link.send(STOP_COMMAND) {
        warn!("failed to send stop command: {e}");
    }
    drop(link);

    debug!(
        "capture for {channel:?} finished with {} samples",
        table.len()
    );
    result.map(|()| table)
}

fn run_window(
    link: &mut impl Transport,
    timing: &ProtocolTiming,
    command: &str,
    duration_s: u64,
    table: &mut SampleTable,
    on_event: &mut dyn FnMut(CaptureEvent),
) -> Result<(), CaptureError> {
    link.send(command.as_bytes())
        .map_err(CaptureError::Transport)?;
    spin_sleep::sleep(timing.command_gap);
    link.send(TARE_COMMAND).map_err(CaptureError::Transport)?;
    spin_sleep::sleep(timing.command_gap);

    let window = Duration::from_secs(duration_s);
    let started = Instant::now();

    while started.elapsed() < window {
        let Some(line) = link.read_line().map_err(CaptureError::Transport)? else {
            continue;
        };
        if line.is_empty() {
            continue;
        }

        match first_reading(&line) {
            Some(value) => {
                let elapsed_s = started.elapsed().as_secs_f64();
                if elapsed_s > duration_s as f64 {
                    // the read straddled the end of the window
                    break;
                }
                table.push(elapsed_s, value);
                on_event(CaptureEvent::Sample { elapsed_s, value });
            }
            None => on_event(CaptureEvent::Diagnostic(line)),
        }
    }

    Ok(())
}

/// Runs [`acquire`] on a worker thread. Events arrive on the returned
/// channel while the capture is in flight; the final table (or error)
/// comes out of the [`JoinHandle`]. This is the hand-off a GUI uses to
/// keep its event loop responsive during the acquisition window.
pub fn spawn_acquire<C>(
    connector: C,
    timing: ProtocolTiming,
    command: String,
    channel: String,
    duration_s: u64,
) -> (
    Receiver<CaptureEvent>,
    JoinHandle<Result<SampleTable, CaptureError>>,
)
where
    C: Connector + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let handle = thread::spawn(move || {
        acquire(
            &connector,
            &timing,
            &command,
            &channel,
            duration_s,
            &mut |event| {
                // the receiver may already be gone; the capture still runs
                // to completion either way
                let _ = tx.send(event);
            },
        )
    });
    (rx, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dummy_device::{ScriptedConnector, ScriptedRead};

    fn timing() -> ProtocolTiming {
        ProtocolTiming {
            settle: Duration::from_millis(1),
            command_gap: Duration::from_millis(1),
        }
    }

    #[test]
    fn zero_duration_is_rejected_before_connecting() {
        let connector = ScriptedConnector::new([]);
        let err = acquire(&connector, &timing(), "1", "ROM Flexion/Extension_deg", 0, &mut |_| {})
            .unwrap_err();
        assert!(matches!(err, CaptureError::InvalidDuration(0)));
        assert_eq!(connector.connect_count(), 0);
    }

    #[test]
    fn connect_failure_is_a_capture_error() {
        let connector = ScriptedConnector::refusing();
        let err = acquire(&connector, &timing(), "1", "ROM Flexion/Extension_deg", 1, &mut |_| {})
            .unwrap_err();
        assert!(matches!(err, CaptureError::Connect(_)));
    }

    #[test]
    fn records_readings_and_surfaces_diagnostics() {
        let connector = ScriptedConnector::new([
            ScriptedRead::Line("BNO ready".into()),
            ScriptedRead::Line("10.5".into()),
            ScriptedRead::Timeout,
            ScriptedRead::Line("".into()),
            ScriptedRead::Line("-3".into()),
        ]);

        let mut diagnostics = Vec::new();
        let table = acquire(
            &connector,
            &timing(),
            "1",
            "ROM Flexion/Extension_deg",
            1,
            &mut |event| {
                if let CaptureEvent::Diagnostic(line) = event {
                    diagnostics.push(line);
                }
            },
        )
        .unwrap();

        assert_eq!(diagnostics, vec!["BNO ready".to_string()]);
        assert_eq!(table.len(), 2);
        let values: Vec<f64> = table.samples().iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![10.5, -3.0]);

        // timestamps are monotonically increasing and inside the window
        let stamps: Vec<f64> = table.samples().iter().map(|(t, _)| *t).collect();
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
        assert!(stamps.iter().all(|t| *t >= 0.0 && *t <= 1.0));

        // protocol order: start command, tare, stop
        let writes = connector.writes();
        assert_eq!(writes[0], b"1".to_vec());
        assert_eq!(writes[1], TARE_COMMAND.to_vec());
        assert_eq!(writes.last().unwrap(), &STOP_COMMAND.to_vec());
    }

    #[test]
    fn zero_samples_is_an_empty_table_not_an_error() {
        let connector = ScriptedConnector::new([ScriptedRead::Line("warming up".into())]);
        let table = acquire(&connector, &timing(), "2", "ROM Ulnar/Radial Deviation_deg", 1, &mut |_| {})
            .unwrap();
        assert!(table.is_empty());
        assert_eq!(table.channel(), "ROM Ulnar/Radial Deviation_deg");
    }

    #[test]
    fn io_failure_aborts_but_still_sends_stop() {
        let connector = ScriptedConnector::new([
            ScriptedRead::Line("10".into()),
            ScriptedRead::Fail,
        ]);
        let err = acquire(&connector, &timing(), "1", "ROM Flexion/Extension_deg", 2, &mut |_| {})
            .unwrap_err();
        assert!(matches!(err, CaptureError::Transport(_)));
        assert_eq!(connector.writes().last().unwrap(), &STOP_COMMAND.to_vec());
    }

    #[test]
    fn terminates_close_to_the_requested_duration() {
        let connector = ScriptedConnector::new([]);
        let started = Instant::now();
        let table = acquire(&connector, &timing(), "1", "Grip Force_Kg", 1, &mut |_| {}).unwrap();
        let elapsed = started.elapsed();

        assert!(table.is_empty());
        assert!(elapsed >= Duration::from_secs(1));
        assert!(elapsed < Duration::from_millis(1500), "took {elapsed:?}");
    }

    #[test]
    fn worker_thread_streams_events_and_returns_the_table() {
        let connector = ScriptedConnector::new([
            ScriptedRead::Line("1.25".into()),
            ScriptedRead::Line("2.5".into()),
        ]);
        let (events, handle) = spawn_acquire(
            connector,
            timing(),
            "1".to_string(),
            "ROM Flexion/Extension_deg".to_string(),
            1,
        );

        let received: Vec<CaptureEvent> = events.iter().collect();
        let table = handle.join().unwrap().unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(
            received
                .iter()
                .filter(|e| matches!(e, CaptureEvent::Sample { .. }))
                .count(),
            2
        );
    }
}
