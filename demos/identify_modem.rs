// ABOUTME: Demo application printing the identity and network state of a GSM modem
// ABOUTME: Queries manufacturer, model, IMEI, IMSI, operator and signal strength

use argh::FromArgs;
use gsm_modem::{GsmModem, ModemConfig};
use std::error::Error;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Print information about a GSM modem
#[derive(FromArgs)]
struct CliArgs {
    /// whether or not to enable debugging
    #[argh(switch, short = 'd')]
    debugging: bool,

    /// the serial port of the modem (default: /dev/ttyUSB0)
    #[argh(option, short = 'p')]
    port: Option<String>,

    /// the baud rate (default: 115200)
    #[argh(option, short = 'b')]
    baud: Option<u32>,

    /// the SIM PIN, if the SIM asks for one
    #[argh(option)]
    pin: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli_args: CliArgs = argh::from_env();

    let level = if cli_args.debugging {
        Level::TRACE
    } else {
        Level::WARN
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let mut config = ModemConfig::new(
        cli_args.port.unwrap_or_else(|| "/dev/ttyUSB0".to_owned()),
        cli_args.baud.unwrap_or(115200),
    );
    if let Some(pin) = cli_args.pin {
        config = config.with_pin(pin);
    }
    let modem = GsmModem::connect(config).await?;

    println!("Manufacturer: {}", modem.manufacturer().await?);
    println!("Model:        {}", modem.model().await?);
    if let Some(revision) = modem.revision().await? {
        println!("Revision:     {revision}");
    }
    println!("IMEI:         {}", modem.imei().await?);
    match modem.imsi().await {
        Ok(imsi) => println!("IMSI:         {imsi}"),
        Err(e) => println!("IMSI:         unavailable ({e})"),
    }
    println!("Call dialect: {:?}", modem.call_dialect());
    println!(
        "Network:      {}",
        modem.network_name().await?.unwrap_or_else(|| "not registered".to_owned())
    );
    match modem.signal_strength().await? {
        Some(rssi) => println!("Signal:       {rssi}/31"),
        None => println!("Signal:       unknown"),
    }
    if let Some(smsc) = modem.smsc().await? {
        println!("SMSC:         {smsc}");
    }

    modem.close().await;
    Ok(())
}
