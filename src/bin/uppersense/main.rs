//! Entry point wiring the capture/aggregation core to the command line.

use clap::Parser;
use log::info;
use serial2::SerialPort;
use std::error::Error;
use std::io;
use std::process::ExitCode;

use chrono::Local;
use uppersense::args::{BridgeCommand, CommandTask, FromCsvCommand, UpperArgs};
use uppersense::bridge::Bridge;
use uppersense::config::CaptureConfig;
use uppersense::csv_io;
use uppersense::dummy_device::DummyConnector;
use uppersense::session::SessionState;

fn main() -> ExitCode {
    env_logger::init();
    let args = UpperArgs::parse();

    let config = match CaptureConfig::load_or_default(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let result = match args.command {
        CommandTask::Bridge(cmd) => run_bridge(config, cmd),
        CommandTask::Ports => list_ports(),
        CommandTask::FromCsv(cmd) => build_from_csvs(config, cmd),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run_bridge(mut config: CaptureConfig, cmd: BridgeCommand) -> Result<(), Box<dyn Error>> {
    if let Some(port) = cmd.port {
        config.port = port;
    }
    if let Some(data_dir) = cmd.data_dir {
        config.data_dir = data_dir;
    }

    let stdin = io::stdin().lock();
    let stdout = io::stdout().lock();

    if cmd.dummy {
        info!("bridge starting against the simulated device");
        let mut bridge = Bridge::new(
            DummyConnector::default(),
            config.timing(),
            config.data_dir,
            config.workbook_name,
        );
        if let Some(dir) = cmd.csv_dir {
            bridge = bridge.with_csv_dir(dir);
        }
        bridge.run(stdin, stdout)?;
    } else {
        info!("bridge starting on {}", config.port);
        let mut bridge = Bridge::new(
            config.serial_connector(),
            config.timing(),
            config.data_dir,
            config.workbook_name,
        );
        if let Some(dir) = cmd.csv_dir {
            bridge = bridge.with_csv_dir(dir);
        }
        bridge.run(stdin, stdout)?;
    }
    Ok(())
}

fn list_ports() -> Result<(), Box<dyn Error>> {
    let ports = SerialPort::available_ports()?;
    if ports.is_empty() {
        println!("no serial devices found");
        return Ok(());
    }
    println!("Available devices:");
    for port in ports {
        println!("\t{}", port.to_string_lossy());
    }
    Ok(())
}

fn build_from_csvs(mut config: CaptureConfig, cmd: FromCsvCommand) -> Result<(), Box<dyn Error>> {
    if let Some(data_dir) = cmd.data_dir {
        config.data_dir = data_dir;
    }

    let mut session = SessionState::new();
    session.set_patient(&cmd.patient)?;

    for file in &cmd.files {
        for table in csv_io::read_capture_csv(file)? {
            info!(
                "loaded {} samples for {:?} from {}",
                table.len(),
                table.channel(),
                file.display()
            );
            session.record(table);
        }
    }

    let saved = session.save(&config.data_dir, &config.workbook_name, Local::now())?;
    println!(
        "saved session sheet {:?} to {}",
        saved.sheet,
        saved.path.display()
    );
    Ok(())
}
