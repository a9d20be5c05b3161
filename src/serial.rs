// ABOUTME: Serial line settings and the ModemPort abstraction over the device handle
// ABOUTME: tokio-serial's SerialStream is the production port; tests plug in an in-memory one

use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_serial::{
    DataBits, FlowControl, Parity, SerialPort, SerialPortBuilderExt, SerialStream, StopBits,
};
use tracing::debug;

/// A full-duplex byte stream to a modem.
///
/// Besides reading and writing, the transport needs to know whether more
/// input is already queued so it can tell when a burst of unsolicited lines
/// has ended.
pub trait ModemPort: AsyncRead + AsyncWrite + Unpin + Send + 'static {
    /// Number of received bytes waiting to be read
    fn bytes_to_read(&self) -> io::Result<u32>;
}

impl ModemPort for SerialStream {
    fn bytes_to_read(&self) -> io::Result<u32> {
        SerialPort::bytes_to_read(self).map_err(io::Error::from)
    }
}

/// Serial line configuration, 8N1 without flow control by default
#[derive(Debug, Clone)]
pub struct SerialSettings {
    pub port: String,
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub parity: Parity,
    pub flow_control: FlowControl,
    /// Read timeout of the underlying device
    pub timeout: Duration,
}

impl SerialSettings {
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
            flow_control: FlowControl::None,
            timeout: Duration::from_millis(100),
        }
    }

    pub fn with_flow_control(mut self, flow_control: FlowControl) -> Self {
        self.flow_control = flow_control;
        self
    }

    /// Opens the device
    pub fn open(&self) -> io::Result<SerialStream> {
        debug!(port = %self.port, baud_rate = self.baud_rate, "Opening serial port");
        let stream = tokio_serial::new(&self.port, self.baud_rate)
            .data_bits(self.data_bits)
            .stop_bits(self.stop_bits)
            .parity(self.parity)
            .flow_control(self.flow_control)
            .timeout(self.timeout)
            .open_native_async()?;
        Ok(stream)
    }
}
