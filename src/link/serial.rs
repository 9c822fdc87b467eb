use async_trait::async_trait;
use log::{debug, error, info};
use serialport::SerialPort;
use std::io::{Read, Write};
use std::time::{Duration, Instant};

use super::transport::Transport;
use crate::utils::error::LinkError;

// Upper bound on a single blocking read so the runtime gets control back regularly
const READ_SLICE: Duration = Duration::from_millis(20);

pub struct SerialTransport {
    port_name: String,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialTransport {
    pub fn open(port_name: &str, baud_rate: u32) -> Result<Self, LinkError> {
        info!("🔌 Connecting to drive on port: {}", port_name);
        info!("⚙️  Configuration: {} baud, 8 data bits, no parity, 1 stop bit", baud_rate);

        let port = serialport::new(port_name, baud_rate)
            .timeout(READ_SLICE)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .flow_control(serialport::FlowControl::None)
            .open()
            .map_err(|e| {
                error!("❌ Failed to open serial port {}: {}", port_name, e);
                LinkError::from(e)
            })?;

        info!("✅ Serial connection established at {} baud", baud_rate);
        Ok(Self {
            port_name: port_name.to_string(),
            port: Some(port),
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn write(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        let port = self.port.as_mut().ok_or(LinkError::Closed)?;
        port.write_all(bytes)?;
        port.flush()?;
        Ok(())
    }

    async fn read(&mut self, max_bytes: usize, timeout: Duration) -> Result<Vec<u8>, LinkError> {
        let port = self.port.as_mut().ok_or(LinkError::Closed)?;
        let mut buffer = vec![0u8; max_bytes.max(1)];
        let start_time = Instant::now();

        loop {
            match port.read(&mut buffer) {
                Ok(n) if n > 0 => {
                    buffer.truncate(n);
                    return Ok(buffer);
                }
                Ok(_) => {}
                Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => {}
                Err(e) => return Err(LinkError::Io(e)),
            }

            if start_time.elapsed() >= timeout {
                return Err(LinkError::Timeout);
            }
            tokio::task::yield_now().await;
        }
    }

    async fn close(&mut self) -> Result<(), LinkError> {
        if self.port.take().is_some() {
            debug!("Dropping serial handle for {}", self.port_name);
            info!("✅ Serial connection {} closed", self.port_name);
        }
        Ok(())
    }
}
