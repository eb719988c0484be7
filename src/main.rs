//! Bench simulator: the controller core against the thermal model, with
//! the JSON protocol on stdin/stdout. Paste commands, watch telemetry:
//!
//! ```text
//! {"type":"startPreheat","timestamp":0,"payload":{"targetTemp":180}}
//! {"type":"loadBeans","timestamp":0,"payload":{"setpoint":200}}
//! {"type":"endRoast","timestamp":0,"payload":{}}
//! ```

use std::io::BufRead;

use embassy_executor::Spawner;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::pipe::Pipe;
use embassy_time::Timer;
use log::*;

use roaster_controller::sim::SimulatedRoaster;
use roaster_controller::{Controller, Link, SYSTEM_TICK_MILLIS};

/// Bytes from the stdin reader thread to the control loop.
static STDIN_PIPE: Pipe<CriticalSectionRawMutex, 1024> = Pipe::new();

struct StdioLink;

impl Link for StdioLink {
    fn poll_byte(&mut self) -> Option<u8> {
        let mut byte = [0u8; 1];
        match STDIN_PIPE.try_read(&mut byte) {
            Ok(n) if n > 0 => Some(byte[0]),
            _ => None,
        }
    }

    fn write_line(&mut self, line: &str) {
        println!("{line}");
    }
}

fn stdin_reader() {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        for chunk in [line.as_bytes(), &b"\n"[..]] {
            let mut offset = 0;
            while offset < chunk.len() {
                match STDIN_PIPE.try_write(&chunk[offset..]) {
                    Ok(written) if written > 0 => offset += written,
                    _ => std::thread::sleep(std::time::Duration::from_millis(1)),
                }
            }
        }
    }
}

#[embassy_executor::task]
async fn control_task() {
    let mut controller = Controller::new(SimulatedRoaster::new());
    let mut link = StdioLink;

    loop {
        controller.tick(&mut link);
        Timer::after_millis(SYSTEM_TICK_MILLIS as u64).await;
    }
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_timestamp_millis()
        .init();

    info!("roaster simulator starting");
    std::thread::spawn(stdin_reader);
    spawner.spawn(control_task()).unwrap();
}
