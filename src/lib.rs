//! Control of GSM modems over a serial line using AT commands.
//!
//! The crate is layered bottom-up:
//!
//! - [`frame`] splits the serial byte stream into lines
//! - [`transport`] owns the port, matches responses to the command in
//!   flight and forwards everything else as notifications
//! - [`dispatcher`] runs notification handling off the IO task
//! - [`modem`] issues commands, tracks calls and sends and receives SMS
//! - [`codec`] and [`datatypes`] encode and decode SMS PDUs
//!   (3GPP TS 23.040 / 23.038)
//!
//! # Examples
//!
//! ## Sending an SMS
//!
//! ```rust,no_run
//! use gsm_modem::{GsmModem, ModemConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let modem = GsmModem::connect(ModemConfig::new("/dev/ttyUSB0", 115200)).await?;
//!     modem.wait_for_network_coverage(std::time::Duration::from_secs(30)).await?;
//!
//!     let sent = modem.send_sms("+27820001111", "Hello, World!").await?;
//!     println!("Sent with reference {:?}", sent.reference);
//!
//!     modem.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Handling calls and incoming messages
//!
//! ```rust,no_run
//! use gsm_modem::{GsmModem, ModemConfig, ModemEvent};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let modem = GsmModem::connect(ModemConfig::default()).await?;
//!     let mut events = modem.subscribe();
//!
//!     while let Ok(event) = events.recv().await {
//!         match event {
//!             ModemEvent::IncomingCall(call) if call.ring_count == 1 => {
//!                 modem.answer(call.id).await?;
//!             }
//!             ModemEvent::SmsReceived(sms) => println!("{}: {}", sms.number, sms.text),
//!             ModemEvent::FatalError(error) => return Err(error.to_string().into()),
//!             _ => {}
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod datatypes;
pub mod dispatcher;
pub mod error;
pub mod frame;
pub mod modem;
pub mod serial;
pub mod transport;

#[cfg(test)]
mod testing;
#[cfg(test)]
mod tests;

pub(crate) const REGEX_COMP_ERROR: &str = "Critical error: Regex compilation has failed.";

pub use codec::{DecodingError, EncodingError, Pdu, SmsPdu, SubmitOptions, encode_sms_submit_pdu};
pub use error::{CmeError, ErrorDomain, GsmError, GsmResult};
pub use frame::{Line, LineFramer};
pub use modem::{
    Call, CallDirection, CallId, CallState, CallType, GsmModem, ModemConfig, ModemEvent,
    ReceivedSms, SentSms, StatusReport,
};
pub use transport::{Transport, TransportEvent};
