use clap::{ArgAction, Parser, Subcommand};
use serial_line::config::{Config, ConfigLoader};
use serial_line::port::{list_ports, LoopbackDriver, NativeDriver, Port, ReadError, SerialDriver};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

/// Device name that selects the in-memory loopback driver.
const LOOPBACK_DEVICE: &str = "LOOP";

/// Pause between polls when nothing has arrived.
const IDLE_POLL: Duration = Duration::from_millis(10);

/// Talk to a serial device from the command line.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Configuration file (overrides the normal lookup).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Device path or alias. Use LOOP for an in-memory loopback device.
    #[arg(short, long, global = true)]
    port: Option<String>,

    /// Baud rate [default: from config, normally 115200].
    #[arg(short, long, global = true)]
    baud: Option<u32>,

    /// Read timeout in milliseconds; 0 disables waiting.
    #[arg(short, long, global = true)]
    timeout_ms: Option<u64>,

    /// More output. Repeat for even more.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the serial devices present on this machine.
    List,

    /// Send a line of text and print the line that comes back.
    Send {
        text: String,
    },

    /// Send raw bytes given as hex and print the same number of bytes back.
    SendHex {
        /// Bytes to send, e.g. 01020304.
        bytes: String,
    },

    /// Print incoming lines.
    Read {
        /// Stop after this many lines; 0 reads forever.
        #[arg(short, long, default_value_t = 0)]
        lines: usize,
    },

    /// Print incoming lines forever, reopening the device whenever it drops.
    Listen {
        /// Delay between reconnection attempts.
        #[arg(long, default_value_t = 1000)]
        retry_ms: u64,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match args.config {
        Some(ref path) => ConfigLoader::load_from(path)?.into_config(),
        None => ConfigLoader::load()?.into_config(),
    };
    if let Err(e) = serial_line::logging::init(&config.logging, args.verbose) {
        eprintln!("Warning: failed to initialise logging: {}", e);
    }

    if let Command::List = args.command {
        return print_ports();
    }

    let name = args.port.as_deref().ok_or("no device given, use --port")?;
    let path = config.serial.resolve_port(name);
    if path == LOOPBACK_DEVICE {
        run(open_port(LoopbackDriver::new(), path, &args, &config), args.command)
    } else {
        run(open_port(NativeDriver::new(), path, &args, &config), args.command)
    }
}

fn open_port<D: SerialDriver>(driver: D, path: String, args: &Args, config: &Config) -> Port<D> {
    let baud = args
        .baud
        .unwrap_or_else(|| config.serial.default_baud.as_u32());
    let timeout = match args.timeout_ms {
        Some(0) => None,
        Some(ms) => Some(Duration::from_millis(ms)),
        None => config.serial.default_timeout(),
    };
    Port::with_driver(driver, path, baud)
        .with_timeout(timeout)
        .with_chunk_size(config.serial.chunk_size)
}

fn run<D: SerialDriver>(port: Port<D>, command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::List => return print_ports(),
        Command::Send { text } => {
            port.open()?;
            port.write_line(&text)?;
            println!("{}", port.read_line()?);
        }
        Command::SendHex { bytes } => {
            let data = hex::decode(bytes.trim())?;
            port.open()?;
            port.write_bytes(&data)?;
            let reply = port.read_bytes(data.len())?;
            println!("{}", hex::encode(reply));
        }
        Command::Read { lines } => {
            port.open()?;
            let mut printed = 0;
            while lines == 0 || printed < lines {
                match port.try_read_line()? {
                    Some(line) => {
                        println!("{}", line);
                        printed += 1;
                    }
                    None => thread::sleep(IDLE_POLL),
                }
            }
        }
        Command::Listen { retry_ms } => listen(&port, Duration::from_millis(retry_ms)),
    }
    port.close()?;
    Ok(())
}

fn print_ports() -> Result<(), Box<dyn std::error::Error>> {
    for name in list_ports()? {
        println!("{}", name);
    }
    Ok(())
}

/// Reconnect loop: keep the device open and print whatever lines arrive.
fn listen<D: SerialDriver>(port: &Port<D>, retry: Duration) -> ! {
    loop {
        if !port.is_open() {
            match port.open() {
                Ok(()) => info!("Connected to {}", port.path()),
                Err(e) => {
                    warn!("{}", e);
                    thread::sleep(retry);
                    continue;
                }
            }
        }

        match port.available() {
            Ok(0) => thread::sleep(IDLE_POLL),
            Ok(_) => match port.try_read_line() {
                Ok(Some(line)) => println!("{}", line),
                Ok(None) => thread::sleep(IDLE_POLL),
                Err(e) => drop_connection(port, e),
            },
            Err(e) => drop_connection(port, e),
        }
    }
}

fn drop_connection<D: SerialDriver>(port: &Port<D>, err: ReadError) {
    warn!("Lost {}: {}", port.path(), err);
    if let Err(e) = port.close() {
        warn!("{}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback() -> (LoopbackDriver, Port<LoopbackDriver>) {
        let driver = LoopbackDriver::with_loopback(false);
        let port = Port::with_driver(driver.clone(), LOOPBACK_DEVICE, 115200).with_timeout(None);
        (driver, port)
    }

    #[test]
    fn test_args_parse_read() {
        let args = Args::try_parse_from(["serial-line", "-p", "LOOP", "-t", "0", "read", "-l", "2"])
            .unwrap();
        assert_eq!(args.port.as_deref(), Some("LOOP"));
        assert_eq!(args.timeout_ms, Some(0));
        assert!(matches!(args.command, Command::Read { lines: 2 }));
    }

    #[test]
    fn test_run_list_does_not_need_port() {
        let (driver, port) = loopback();
        // Only the device listing itself may fail, never the dispatch.
        let _ = run(port, Command::List);
        assert_eq!(driver.acquire_calls(), 0);
    }

    #[test]
    fn test_run_read_waits_for_whole_line() {
        let (driver, port) = loopback();
        driver.enqueue_read(b"Hel");
        let sender = {
            let driver = driver.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                driver.enqueue_read(b"lo\r\n");
            })
        };

        run(port, Command::Read { lines: 1 }).unwrap();

        sender.join().unwrap();
        assert_eq!(driver.pending(), 0);
        assert_eq!(driver.release_calls(), 1);
    }
}
