//! Serial port discovery
//!
//! Enumerates serial ports and picks the first whose name, description or
//! hardware id contains one of the configured keywords (case-insensitive). Enumeration
//! order decides ties.

use crate::error::Result;
use serialport::SerialPortType;

/// One enumerated serial port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Device path or name (`/dev/ttyUSB0`, `COM3`)
    pub name: String,
    /// Product / manufacturer text
    pub description: String,
    /// Hardware id (`USB VID:PID=1A86:7523 SER=...`)
    pub hwid: String,
}

impl PortInfo {
    /// Whether any keyword appears in the name, description or hardware id
    pub fn matches(&self, keywords: &[String]) -> bool {
        let haystack = [&self.name, &self.description, &self.hwid].map(|s| s.to_lowercase());
        keywords
            .iter()
            .map(|k| k.to_lowercase())
            .filter(|k| !k.is_empty())
            .any(|k| haystack.iter().any(|field| field.contains(&k)))
    }
}

/// Source of port listings
pub trait PortScanner: Send {
    fn scan(&self) -> Result<Vec<PortInfo>>;
}

/// Scanner backed by the operating system
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemScanner;

impl PortScanner for SystemScanner {
    fn scan(&self) -> Result<Vec<PortInfo>> {
        let ports = serialport::available_ports()?;
        Ok(ports
            .into_iter()
            .map(|port| {
                let (description, hwid) = match &port.port_type {
                    SerialPortType::UsbPort(usb) => {
                        let description = [usb.manufacturer.as_deref(), usb.product.as_deref()]
                            .into_iter()
                            .flatten()
                            .collect::<Vec<_>>()
                            .join(" ");
                        let mut hwid = format!("USB VID:PID={:04X}:{:04X}", usb.vid, usb.pid);
                        if let Some(serial) = &usb.serial_number {
                            hwid.push_str(&format!(" SER={}", serial));
                        }
                        (description, hwid)
                    }
                    SerialPortType::PciPort => ("PCI".to_string(), String::new()),
                    SerialPortType::BluetoothPort => ("Bluetooth".to_string(), String::new()),
                    SerialPortType::Unknown => (String::new(), String::new()),
                };
                PortInfo {
                    name: port.port_name,
                    description,
                    hwid,
                }
            })
            .collect())
    }
}

/// Scanner returning a fixed list
#[derive(Debug, Clone, Default)]
pub struct StaticScanner(pub Vec<PortInfo>);

impl PortScanner for StaticScanner {
    fn scan(&self) -> Result<Vec<PortInfo>> {
        Ok(self.0.clone())
    }
}

/// First port matching any keyword
pub fn select_port<'a>(ports: &'a [PortInfo], keywords: &[String]) -> Option<&'a PortInfo> {
    ports.iter().find(|port| port.matches(keywords))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port(name: &str, description: &str, hwid: &str) -> PortInfo {
        PortInfo {
            name: name.to_string(),
            description: description.to_string(),
            hwid: hwid.to_string(),
        }
    }

    fn keywords() -> Vec<String> {
        ["arduino", "ch340", "cp210x"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_first_match_wins() {
        let ports = vec![
            port("/dev/ttyS0", "", ""),
            port("/dev/ttyUSB0", "QinHeng USB-Serial CH340", "USB VID:PID=1A86:7523"),
            port("/dev/ttyACM0", "Arduino Uno", "USB VID:PID=2341:0043"),
        ];
        assert_eq!(
            select_port(&ports, &keywords()).map(|p| p.name.as_str()),
            Some("/dev/ttyUSB0")
        );
    }

    #[test]
    fn test_match_in_hwid() {
        let ports = vec![port("COM5", "USB Serial Device", "USB VID:PID=10C4:EA60 CP210x")];
        assert!(select_port(&ports, &keywords()).is_some());
    }

    #[test]
    fn test_match_in_name() {
        let ports = vec![port("/dev/cu.usbmodem1101", "", "")];
        let keywords = vec!["usbmodem".to_string()];
        assert!(select_port(&ports, &keywords).is_some());
    }

    #[test]
    fn test_no_match() {
        let ports = vec![port("COM1", "Communications Port", "ACPI\\PNP0501")];
        assert_eq!(select_port(&ports, &keywords()), None);
        assert_eq!(select_port(&[], &keywords()), None);
        assert_eq!(select_port(&ports, &[]), None);
    }

    #[test]
    fn test_static_scanner() {
        let scanner = StaticScanner(vec![port("COM7", "Arduino Mega", "")]);
        let ports = scanner.scan().unwrap();
        assert_eq!(ports.len(), 1);
        assert!(ports[0].matches(&keywords()));
    }
}
