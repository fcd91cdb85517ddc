//! Serial port sources for the sensor boards

use std::io::{BufRead, BufReader, ErrorKind};
use std::time::Duration;

use serialport::{ClearBuffer, FlowControl, SerialPort, SerialPortType};

use super::source::{AcquisitionError, LineSource, SourceProvider};
use crate::config::AcquisitionConfig;

/// USB vendor ids of the board families used in the mattress
/// (Arduino, Arduino.org, WCH CH340, FTDI)
const BOARD_VENDOR_IDS: &[u16] = &[0x2341, 0x2a03, 0x1a86, 0x0403];

/// Longest partial line kept across read timeouts before it is dropped
const MAX_PENDING_BYTES: usize = 4096;

/// One sensor board behind a serial port
pub struct SerialLineSource {
    path: String,
    baud_rate: u32,
    read_timeout: Duration,
    reader: Option<BufReader<Box<dyn SerialPort>>>,
    pending: Vec<u8>,
}

impl SerialLineSource {
    pub fn new(path: impl Into<String>, baud_rate: u32, read_timeout: Duration) -> Self {
        Self {
            path: path.into(),
            baud_rate,
            read_timeout,
            reader: None,
            pending: Vec::with_capacity(256),
        }
    }
}

impl LineSource for SerialLineSource {
    fn name(&self) -> &str {
        &self.path
    }

    fn open(&mut self) -> Result<(), AcquisitionError> {
        let port = serialport::new(&self.path, self.baud_rate)
            .timeout(self.read_timeout)
            .flow_control(FlowControl::None)
            .open()
            .map_err(|e| AcquisitionError::Open {
                name: self.path.clone(),
                message: e.to_string(),
            })?;

        if let Err(e) = port.clear(ClearBuffer::Input) {
            tracing::debug!(port = %self.path, error = %e, "Could not flush input buffer");
        }

        self.reader = Some(BufReader::new(port));
        self.pending.clear();
        Ok(())
    }

    fn read_line(&mut self) -> Result<Option<String>, AcquisitionError> {
        let reader = self.reader.as_mut().ok_or_else(|| AcquisitionError::Read {
            name: self.path.clone(),
            message: "port not open".to_string(),
        })?;

        match reader.read_until(b'\n', &mut self.pending) {
            Ok(0) => Err(AcquisitionError::SourceClosed(self.path.clone())),
            Ok(_) if self.pending.ends_with(b"\n") => {
                let line = String::from_utf8_lossy(&self.pending)
                    .trim_end_matches(&['\r', '\n'][..])
                    .to_string();
                self.pending.clear();
                Ok(Some(line))
            }
            Ok(_) => Ok(None),
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
                if self.pending.len() > MAX_PENDING_BYTES {
                    tracing::warn!(port = %self.path, bytes = self.pending.len(), "Dropping oversized partial line");
                    self.pending.clear();
                }
                Ok(None)
            }
            Err(e) => Err(AcquisitionError::Read {
                name: self.path.clone(),
                message: e.to_string(),
            }),
        }
    }
}

// ============================================================================
// Enumeration
// ============================================================================

/// Discovers sensor boards among the host's serial ports
#[derive(Debug, Clone)]
pub struct SerialPortProvider {
    ports: Vec<String>,
    patterns: Vec<String>,
    baud_rate: u32,
    read_timeout: Duration,
}

impl SerialPortProvider {
    pub fn from_config(config: &AcquisitionConfig) -> Self {
        Self {
            ports: config.ports.clone(),
            patterns: config.port_patterns.clone(),
            baud_rate: config.baud_rate,
            read_timeout: Duration::from_millis(config.read_timeout_ms),
        }
    }

    fn is_candidate(&self, info: &serialport::SerialPortInfo) -> bool {
        let name = info.port_name.to_lowercase();
        if self.patterns.iter().any(|p| name.contains(&p.to_lowercase())) {
            return true;
        }
        matches!(&info.port_type, SerialPortType::UsbPort(usb) if BOARD_VENDOR_IDS.contains(&usb.vid))
    }
}

impl SourceProvider for SerialPortProvider {
    fn discover(&self) -> Result<Vec<Box<dyn LineSource>>, AcquisitionError> {
        let names: Vec<String> = if self.ports.is_empty() {
            let mut found: Vec<String> = serialport::available_ports()
                .map_err(|e| AcquisitionError::Enumerate(e.to_string()))?
                .into_iter()
                .filter(|info| self.is_candidate(info))
                .map(|info| info.port_name)
                .collect();
            found.sort();
            found.dedup();
            found
        } else {
            self.ports.clone()
        };

        tracing::info!(count = names.len(), ports = ?names, "Discovered serial sources");

        Ok(names
            .into_iter()
            .map(|name| {
                Box::new(SerialLineSource::new(name, self.baud_rate, self.read_timeout))
                    as Box<dyn LineSource>
            })
            .collect())
    }

    fn provider_name(&self) -> &str {
        "serial"
    }
}

/// One enumerated port, for `--list-ports`
#[derive(Debug, Clone)]
pub struct PortListing {
    pub name: String,
    pub kind: &'static str,
    pub description: Option<String>,
}

/// List every serial port the host reports
pub fn list_ports() -> Result<Vec<PortListing>, AcquisitionError> {
    let ports = serialport::available_ports().map_err(|e| AcquisitionError::Enumerate(e.to_string()))?;
    Ok(ports
        .into_iter()
        .map(|port| {
            let description = match &port.port_type {
                SerialPortType::UsbPort(info) => Some(format!(
                    "VID 0x{:04x} PID 0x{:04x} {}",
                    info.vid,
                    info.pid,
                    info.product.as_deref().unwrap_or("")
                )),
                _ => None,
            };
            PortListing {
                name: port.port_name,
                kind: port_type_name(&port.port_type),
                description,
            }
        })
        .collect())
}

fn port_type_name(port_type: &SerialPortType) -> &'static str {
    match port_type {
        SerialPortType::UsbPort(_) => "USB",
        SerialPortType::BluetoothPort => "Bluetooth",
        SerialPortType::PciPort => "PCI",
        SerialPortType::Unknown => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_ports_skip_enumeration() {
        let config = AcquisitionConfig {
            ports: vec!["/dev/ttyUSB7".to_string(), "/dev/ttyUSB8".to_string()],
            ..AcquisitionConfig::default()
        };
        let sources = SerialPortProvider::from_config(&config).discover().unwrap();
        let names: Vec<&str> = sources.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["/dev/ttyUSB7", "/dev/ttyUSB8"]);
    }

    #[test]
    fn test_pattern_matching_is_case_insensitive() {
        let provider = SerialPortProvider::from_config(&AcquisitionConfig::default());
        let info = serialport::SerialPortInfo {
            port_name: "/dev/TTYACM0".to_string(),
            port_type: SerialPortType::Unknown,
        };
        assert!(provider.is_candidate(&info));

        let other = serialport::SerialPortInfo {
            port_name: "/dev/ttyS0".to_string(),
            port_type: SerialPortType::PciPort,
        };
        assert!(!provider.is_candidate(&other));
    }

    #[test]
    fn test_read_before_open_is_an_error() {
        let mut source = SerialLineSource::new("/dev/null-port", 115_200, Duration::from_millis(10));
        assert!(matches!(source.read_line(), Err(AcquisitionError::Read { .. })));
    }
}
