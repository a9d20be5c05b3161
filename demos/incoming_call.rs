// ABOUTME: Demo application reacting to modem events: answers calls and prints messages
// ABOUTME: Plays DTMF tones on answered calls and hangs up after a delay

use argh::FromArgs;
use gsm_modem::{GsmModem, ModemConfig, ModemEvent};
use std::error::Error;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

/// Answer incoming calls and print received messages
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

    /// answer after this many rings (default: 2)
    #[argh(option)]
    rings: Option<u32>,

    /// DTMF tones to play once a call is answered
    #[argh(option)]
    tones: Option<String>,

    /// seconds before hanging up an answered call (default: 10)
    #[argh(option)]
    hangup_after: Option<u64>,
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

    let config = ModemConfig::new(
        cli_args.port.unwrap_or_else(|| "/dev/ttyUSB0".to_owned()),
        cli_args.baud.unwrap_or(115200),
    );
    let rings = cli_args.rings.unwrap_or(2);
    let hangup_after = Duration::from_secs(cli_args.hangup_after.unwrap_or(10));

    let modem = GsmModem::connect(config).await?;
    let mut events = modem.subscribe();
    info!("Waiting for calls and messages");

    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Missed modem events");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        match event {
            ModemEvent::IncomingCall(call) if call.ring_count == rings => {
                info!(id = call.id, number = ?call.number, "Answering call");
                modem.answer(call.id).await?;
                if let Some(tones) = &cli_args.tones {
                    if let Err(e) = modem.send_dtmf(call.id, tones).await {
                        warn!(error = %e, "Could not play DTMF tones");
                    }
                }
                let modem = modem.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(hangup_after).await;
                    if modem.call(call.id).is_some() {
                        if let Err(e) = modem.hangup(call.id).await {
                            warn!(error = %e, "Hangup failed");
                        }
                    }
                });
            }
            ModemEvent::IncomingCall(call) => info!(id = call.id, rings = call.ring_count, "Ringing"),
            ModemEvent::CallEnded(call) => info!(id = call.id, "Call ended"),
            ModemEvent::SmsReceived(sms) => println!("SMS from {} at {}: {}", sms.number, sms.time, sms.text),
            ModemEvent::StatusReport(report) => {
                println!("Status report for {}: {:?}", report.reference, report.status)
            }
            ModemEvent::FatalError(error) => {
                eprintln!("Modem failed: {error}");
                return Err(Box::<dyn Error>::from(error.to_string()));
            }
            ModemEvent::CallAnswered(_) => {}
        }
    }

    modem.close().await;
    Ok(())
}
