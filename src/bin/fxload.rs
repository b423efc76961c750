//! fxload - programs EZ-USB FX2 devices and accesses their EEPROM.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use fx2load::Fx2;

#[derive(Parser)]
#[command(name = "fxload")]
#[command(version, about = "Program Cypress EZ-USB FX2 microcontrollers", long_about = None)]
struct Cli {
    /// Firmware to load, as an Intel HEX file
    #[arg(short, long, value_name = "firmware.hex")]
    input: Option<PathBuf>,

    /// Select the target device by USB <vid>:<pid> (hex)
    #[arg(short, long, value_name = "vid:pid", conflicts_with = "address")]
    device: Option<String>,

    /// Select the target device by USB <bus>,<addr>
    #[arg(short, long, value_name = "bus,addr")]
    address: Option<String>,

    /// Read bytes from the EEPROM (default 8)
    #[arg(short, long, value_name = "length", num_args = 0..=1, default_missing_value = "8")]
    read_eeprom: Option<usize>,

    /// Write hex data to the EEPROM
    #[arg(short, long, value_name = "hexdata")]
    write_eeprom: Option<String>,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn parse_vid_pid(spec: &str) -> Result<(u16, u16), String> {
    let (vid, pid) = spec
        .split_once(':')
        .ok_or_else(|| format!("invalid device '{}', expected <vid>:<pid>", spec))?;
    let vid = u16::from_str_radix(vid.trim_start_matches("0x"), 16)
        .map_err(|e| format!("invalid vendor ID: {}", e))?;
    let pid = u16::from_str_radix(pid.trim_start_matches("0x"), 16)
        .map_err(|e| format!("invalid product ID: {}", e))?;
    Ok((vid, pid))
}

fn parse_bus_address(spec: &str) -> Result<(u8, u8), String> {
    let (bus, addr) = spec
        .split_once(',')
        .ok_or_else(|| format!("invalid address '{}', expected <bus>,<addr>", spec))?;
    let bus = bus
        .trim()
        .parse()
        .map_err(|e| format!("invalid bus number: {}", e))?;
    let addr = addr
        .trim()
        .parse()
        .map_err(|e| format!("invalid bus address: {}", e))?;
    Ok((bus, addr))
}

fn parse_hex_data(data: &str) -> Result<Vec<u8>, String> {
    if data.len() % 2 != 0 {
        return Err("an odd number of hex characters was supplied".into());
    }
    (0..data.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&data[i..i + 2], 16)
                .map_err(|e| format!("invalid hex data: {}", e))
        })
        .collect()
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut device = if let Some(spec) = cli.device.as_deref() {
        let (vid, pid) = parse_vid_pid(spec)?;
        Fx2::open_with_vid_pid(vid, pid)?
    } else if let Some(spec) = cli.address.as_deref() {
        let (bus, addr) = parse_bus_address(spec)?;
        Fx2::open_with_bus_address(bus, addr)?
    } else {
        return Err("no device was specified (use --device or --address)".into());
    };

    if let Some(length) = cli.read_eeprom {
        let data = device.read_eeprom(length)?;
        print!("EEPROM[{}]:", data.len());
        for byte in &data {
            print!(" {:02x}", byte);
        }
        println!();
    }

    if let Some(hexdata) = cli.write_eeprom.as_deref() {
        let data = parse_hex_data(hexdata)?;
        println!("Writing {} bytes to EEPROM...", data.len());
        let wrote = device.write_eeprom(&data)?;
        if wrote != data.len() {
            return Err(format!("EEPROM accepted only {} of {} bytes", wrote, data.len()).into());
        }
    }

    if let Some(input) = cli.input.as_deref() {
        println!("Programming '{}'...", input.display());
        let written = device.load_firmware_file(input)?;
        println!("complete, {} bytes", written);
    }

    Ok(())
}

/// Default env_logger filter for a `-v` count. The filter has to be chosen
/// before the logger is built; raising the facade's max level afterwards
/// would not get past env_logger's own filtering.
fn default_log_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_log_filter(cli.verbose)),
    )
    .init();

    if let Err(error) = run(cli) {
        eprintln!("Error: {}", error);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
