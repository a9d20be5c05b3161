// ABOUTME: Demo application sending an SMS through a GSM modem on a serial port
// ABOUTME: Optionally requests a status report and waits for the delivery outcome

use argh::FromArgs;
use gsm_modem::{GsmModem, ModemConfig};
use std::error::Error;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Send an SMS message through a GSM modem
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

    /// use SMS text mode instead of PDU mode
    #[argh(switch)]
    text_mode: bool,

    /// request a status report and wait this many seconds for it
    #[argh(option)]
    report_timeout: Option<u64>,

    /// the message to send
    #[argh(option, short = 'm')]
    message: String,

    /// the recipient telephone number
    #[argh(option, short = 't')]
    to: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli_args: CliArgs = argh::from_env();

    let level = if cli_args.debugging {
        Level::TRACE
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let mut config = ModemConfig::new(
        cli_args.port.unwrap_or_else(|| "/dev/ttyUSB0".to_owned()),
        cli_args.baud.unwrap_or(115200),
    )
    .with_sms_text_mode(cli_args.text_mode);
    if let Some(pin) = cli_args.pin {
        config = config.with_pin(pin);
    }

    let modem = GsmModem::connect(config).await?;
    let signal = modem
        .wait_for_network_coverage(Duration::from_secs(30))
        .await?;
    println!("Network coverage, signal strength {signal}");

    let result = match cli_args.report_timeout {
        Some(seconds) => {
            modem
                .send_sms_with_report(&cli_args.to, &cli_args.message, Duration::from_secs(seconds))
                .await
        }
        None => modem.send_sms(&cli_args.to, &cli_args.message).await,
    };

    match result {
        Ok(sent) => {
            println!(
                "Message sent, reference {:?}, status {:?}",
                sent.reference,
                sent.status()
            );
            modem.close().await;
            Ok(())
        }
        Err(e) => {
            eprintln!("Failed to send message: {e}");
            modem.close().await;
            Err(Box::<dyn Error>::from(e.to_string()))
        }
    }
}
