use edvm_types::types::RegValue;
use std::{
    io::{self, BufRead, Write},
    time::{SystemTime, UNIX_EPOCH},
};

/// Console / keyboard port.
pub const CONSOLE_PORT: u16 = 0;
/// Timer / serial line port.
pub const TIMER_PORT: u16 = 1;

/// Bus behind the IN/OUT instructions and the PRINT diagnostic channel.
///
/// The engine only ever talks to this trait, so a test harness can swap in
/// a recording implementation. Unknown ports read as zero and swallow
/// writes; port I/O never fails.
pub trait PortBus {
    fn read(&mut self, port: u16) -> RegValue;
    fn write(&mut self, port: u16, value: RegValue);
    /// Destination of the PRINT instruction.
    fn print(&mut self, value: RegValue);
}

/// Default bus wired to the process console and the wall clock.
///
/// Port 0 reads one decimal integer per line from stdin and writes the
/// value as decimal plus its ASCII character; port 1 reads the low 32 bits
/// of the wall-clock seconds and writes hex.
#[derive(Debug, Default)]
pub struct ConsoleBus;

impl PortBus for ConsoleBus {
    fn read(&mut self, port: u16) -> RegValue {
        match port {
            CONSOLE_PORT => {
                let mut line = String::new();
                match io::stdin().lock().read_line(&mut line) {
                    Ok(_) => line.trim().parse().unwrap_or(0),
                    Err(_) => 0,
                }
            }
            TIMER_PORT => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.as_secs() & 0xFFFF_FFFF)
                .unwrap_or(0),
            _ => 0,
        }
    }

    fn write(&mut self, port: u16, value: RegValue) {
        let mut stdout = io::stdout().lock();
        match port {
            CONSOLE_PORT => {
                let ascii = char::from_u32((value & 0x7F) as u32)
                    .filter(|c| c.is_ascii_graphic())
                    .unwrap_or('.');
                let _ = writeln!(stdout, "{value} '{ascii}'");
            }
            TIMER_PORT => {
                let _ = writeln!(stdout, "{value:#x}");
            }
            _ => {}
        }
    }

    fn print(&mut self, value: RegValue) {
        let mut stdout = io::stdout().lock();
        let _ = writeln!(stdout, "{value}");
    }
}
