//! Simulated sensor devices. [`DummyConnector`] produces a plausible,
//! noisy stream for running the whole pipeline without hardware;
//! [`ScriptedConnector`] replays an exact sequence of reads so tests can
//! drive the capture loop deterministically.

use crate::transport::{Connector, Transport};

use rand::prelude::*;
use std::collections::VecDeque;
use std::f64::consts::PI;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Opens simulated links that behave like the real firmware: they answer a
/// start command with a stream of readings, echo `ZERO_OK` on tare, and go
/// quiet after the stop command.
#[derive(Debug, Clone)]
pub struct DummyConnector {
    /// Time between generated readings.
    pub sample_period: Duration,
}

impl Default for DummyConnector {
    fn default() -> Self {
        Self {
            sample_period: Duration::from_millis(20),
        }
    }
}

impl Connector for DummyConnector {
    type Link = DummyLink;

    fn connect(&self) -> io::Result<DummyLink> {
        Ok(DummyLink {
            rng: thread_rng(),
            sample_period: self.sample_period,
            tick: 0,
            started: false,
            stopped: false,
            banner_sent: false,
            tare_pending: false,
        })
    }
}

/// One simulated device conversation. Readings follow a slow sweep with a
/// little noise, roughly what a wrist tracing looks like.
pub struct DummyLink {
    rng: ThreadRng,
    sample_period: Duration,
    tick: u64,
    started: bool,
    stopped: bool,
    banner_sent: bool,
    tare_pending: bool,
}

impl Transport for DummyLink {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        match bytes {
            b"e" => self.stopped = true,
            b" " => self.tare_pending = true,
            _ => self.started = true,
        }
        Ok(())
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        spin_sleep::sleep(self.sample_period);

        if self.stopped || !self.started {
            return Ok(None);
        }
        if !self.banner_sent {
            self.banner_sent = true;
            return Ok(Some("BNO055 ready".to_string()));
        }
        if self.tare_pending {
            self.tare_pending = false;
            return Ok(Some("ZERO_OK".to_string()));
        }

        self.tick += 1;
        let phase = self.tick as f64 * self.sample_period.as_secs_f64();
        let value = 45.0 * (phase * 0.8 * PI).sin() + self.rng.gen_range(-0.5..0.5);
        Ok(Some(format!("{value:.2}")))
    }
}

/// One scripted read result.
#[derive(Debug, Clone)]
pub enum ScriptedRead {
    /// A complete line arrived.
    Line(String),
    /// The read timed out without a line.
    Timeout,
    /// The link failed fatally.
    Fail,
}

/// Replays a fixed read script and records everything written to the
/// device, so tests can assert on the exact protocol exchange. Once the
/// script runs dry every read times out (after a short pause, to mimic a
/// blocking read).
#[derive(Debug, Clone)]
pub struct ScriptedConnector {
    script: Arc<Mutex<VecDeque<ScriptedRead>>>,
    writes: Arc<Mutex<Vec<Vec<u8>>>>,
    connects: Arc<Mutex<usize>>,
    refuse_connect: bool,
}

impl ScriptedConnector {
    /// A connector whose links will replay `script` in order.
    pub fn new(script: impl IntoIterator<Item = ScriptedRead>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into_iter().collect())),
            writes: Arc::new(Mutex::new(Vec::new())),
            connects: Arc::new(Mutex::new(0)),
            refuse_connect: false,
        }
    }

    /// A connector whose `connect` always fails, as if the port were absent.
    pub fn refusing() -> Self {
        let mut connector = Self::new([]);
        connector.refuse_connect = true;
        connector
    }

    /// Everything written to the device so far, one entry per `send`.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.writes.lock().unwrap().clone()
    }

    /// How many links have been opened.
    pub fn connect_count(&self) -> usize {
        *self.connects.lock().unwrap()
    }
}

impl Connector for ScriptedConnector {
    type Link = ScriptedLink;

    fn connect(&self) -> io::Result<ScriptedLink> {
        if self.refuse_connect {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                "scripted connector refused to open",
            ));
        }
        *self.connects.lock().unwrap() += 1;
        Ok(ScriptedLink {
            script: Arc::clone(&self.script),
            writes: Arc::clone(&self.writes),
        })
    }
}

/// The link half of [`ScriptedConnector`].
pub struct ScriptedLink {
    script: Arc<Mutex<VecDeque<ScriptedRead>>>,
    writes: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl Transport for ScriptedLink {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.writes.lock().unwrap().push(bytes.to_vec());
        Ok(())
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(ScriptedRead::Line(line)) => Ok(Some(line)),
            Some(ScriptedRead::Timeout) | None => {
                spin_sleep::sleep(Duration::from_millis(25));
                Ok(None)
            }
            Some(ScriptedRead::Fail) => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "scripted link failure",
            )),
        }
    }
}
