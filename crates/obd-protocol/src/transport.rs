//! Byte-level transports to the adapter
//!
//! Serial ports and Bluetooth RFCOMM links (bound by the OS as serial
//! devices, e.g. `/dev/rfcomm0`) both surface as a tokio-serial stream. The
//! mock transport runs the in-process adapter emulator.

use crate::error::ObdError;
use crate::mock::MockAdapter;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_serial::{DataBits, Parity, SerialPortBuilderExt, SerialPortType, StopBits};
use tracing::{debug, info};

/// Default ELM327 serial speed
pub const DEFAULT_BAUD_RATE: u32 = 38400;

/// Name fragments identifying adapters during discovery
pub const ADAPTER_KEYWORDS: [&str; 5] = ["OBD", "ELM327", "VLINK", "RFCOMM", "BLUETOOTH"];

/// Any duplex byte stream the command channel can drive
pub trait AdapterStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> AdapterStream for T {}

/// Owned, type-erased adapter stream
pub type BoxedStream = Box<dyn AdapterStream>;

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_keywords() -> Vec<String> {
    ADAPTER_KEYWORDS.iter().map(|k| k.to_string()).collect()
}

/// How to reach the adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportConfig {
    /// Wired serial device
    Serial {
        path: String,
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
    },
    /// First discovered RFCOMM/serial port whose name matches a keyword
    Bluetooth {
        #[serde(default = "default_keywords")]
        keywords: Vec<String>,
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
    },
    /// In-process adapter emulator driving a simulated vehicle
    Mock,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig::Bluetooth {
            keywords: default_keywords(),
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

/// A port that looks like an OBD adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredPort {
    /// Device path to open
    pub path: String,
    /// Product/manufacturer text reported by the OS
    pub description: String,
}

/// Enumerate system ports whose name or description contains a keyword
pub fn discover_adapters(keywords: &[String]) -> Result<Vec<DiscoveredPort>, ObdError> {
    let ports = tokio_serial::available_ports()?;
    let found: Vec<DiscoveredPort> = ports
        .into_iter()
        .map(|port| {
            let description = match port.port_type {
                SerialPortType::UsbPort(usb) => [usb.manufacturer, usb.product]
                    .into_iter()
                    .flatten()
                    .collect::<Vec<_>>()
                    .join(" "),
                SerialPortType::BluetoothPort => "Bluetooth".to_string(),
                _ => String::new(),
            };
            DiscoveredPort {
                path: port.port_name,
                description,
            }
        })
        .filter(|port| matches_keywords(port, keywords))
        .collect();

    debug!("Discovered {} candidate adapter port(s)", found.len());
    Ok(found)
}

fn matches_keywords(port: &DiscoveredPort, keywords: &[String]) -> bool {
    let haystack = format!("{} {}", port.path, port.description).to_uppercase();
    keywords
        .iter()
        .any(|keyword| haystack.contains(&keyword.to_uppercase()))
}

fn open_serial(path: &str, baud_rate: u32) -> Result<BoxedStream, ObdError> {
    info!("Opening serial port {} at {} baud", path, baud_rate);
    let stream = tokio_serial::new(path, baud_rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .open_native_async()?;
    Ok(Box::new(stream))
}

/// Open the configured transport
pub fn open(config: &TransportConfig) -> Result<BoxedStream, ObdError> {
    match config {
        TransportConfig::Serial { path, baud_rate } => open_serial(path, *baud_rate),
        TransportConfig::Bluetooth { keywords, baud_rate } => {
            let port = discover_adapters(keywords)?
                .into_iter()
                .next()
                .ok_or_else(|| ObdError::AdapterNotFound(keywords.clone()))?;
            info!("Using adapter {} ({})", port.path, port.description);
            open_serial(&port.path, *baud_rate)
        }
        TransportConfig::Mock => {
            info!("Opening mock adapter transport");
            Ok(Box::new(MockAdapter::new().with_simulator().spawn()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port(path: &str, description: &str) -> DiscoveredPort {
        DiscoveredPort {
            path: path.to_string(),
            description: description.to_string(),
        }
    }

    #[test]
    fn test_keyword_matching_is_case_insensitive() {
        let keywords = default_keywords();
        assert!(matches_keywords(&port("/dev/rfcomm0", ""), &keywords));
        assert!(matches_keywords(&port("/dev/ttyUSB0", "Vgate vLink iCar"), &keywords));
        assert!(!matches_keywords(&port("/dev/ttyS0", "16550A UART"), &keywords));
    }

    #[test]
    fn test_transport_config_from_toml_shape() {
        let config: TransportConfig =
            serde_json::from_str(r#"{"kind":"serial","path":"/dev/ttyUSB0"}"#).unwrap();
        assert_eq!(
            config,
            TransportConfig::Serial {
                path: "/dev/ttyUSB0".to_string(),
                baud_rate: DEFAULT_BAUD_RATE
            }
        );
    }

    #[tokio::test]
    async fn test_mock_transport_opens() {
        assert!(open(&TransportConfig::Mock).is_ok());
    }
}
