//! USB device records and identity
//!
//! A [`DeviceRecord`] is one observation of an attached device, captured as
//! part of a snapshot. Its [`DeviceIdentity`] is what the diff engine uses to
//! recognize the same physical device across polls.

use std::fmt;

/// Placeholder written wherever a device name could not be read
pub const UNKNOWN_NAME: &str = "unknown";

/// Key recognizing the same physical device across polls
///
/// Resolution prefers the most stable information available:
///
/// 1. [`DeviceIdentity::Port`] when the bus topology (bus number and hub
///    port chain) is known. Vendor and product IDs are part of the key so a
///    different device swapped into the same port between two polls still
///    shows up as a disconnect/connect pair.
/// 2. [`DeviceIdentity::Serial`] when only descriptors are known and the
///    device reports a serial number.
/// 3. [`DeviceIdentity::Ids`] as a last resort.
///
/// Known limitation: two physically distinct devices sharing both IDs,
/// without a serial number and without a known port path, resolve to the
/// same `Ids` key and cannot be told apart.
///
/// The derived `Ord` gives the total order used to sort event batches.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DeviceIdentity {
    /// Physical position on the bus
    Port {
        bus: u8,
        ports: Vec<u8>,
        vendor_id: u16,
        product_id: u16,
    },
    /// Descriptor IDs plus serial number
    Serial {
        vendor_id: u16,
        product_id: u16,
        serial: String,
    },
    /// Descriptor IDs only
    Ids { vendor_id: u16, product_id: u16 },
}

impl DeviceIdentity {
    /// Pick the most stable identity for the given observation
    pub fn resolve(
        vendor_id: u16,
        product_id: u16,
        port_path: Option<(u8, &[u8])>,
        serial: Option<&str>,
    ) -> Self {
        if let Some((bus, ports)) = port_path {
            return DeviceIdentity::Port {
                bus,
                ports: ports.to_vec(),
                vendor_id,
                product_id,
            };
        }

        match serial.map(str::trim).filter(|s| !s.is_empty()) {
            Some(serial) => DeviceIdentity::Serial {
                vendor_id,
                product_id,
                serial: serial.to_string(),
            },
            None => DeviceIdentity::Ids {
                vendor_id,
                product_id,
            },
        }
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceIdentity::Port { bus, ports, .. } => {
                // sysfs-style: "1-2.4", root hubs as "1-0"
                write!(f, "{}-", bus)?;
                if ports.is_empty() {
                    return write!(f, "0");
                }
                for (i, port) in ports.iter().enumerate() {
                    if i > 0 {
                        write!(f, ".")?;
                    }
                    write!(f, "{}", port)?;
                }
                Ok(())
            }
            DeviceIdentity::Serial {
                vendor_id,
                product_id,
                serial,
            } => write!(f, "{:04x}:{:04x}/{}", vendor_id, product_id, serial),
            DeviceIdentity::Ids {
                vendor_id,
                product_id,
            } => write!(f, "{:04x}:{:04x}", vendor_id, product_id),
        }
    }
}

/// One observation of an attached USB device
///
/// Records are built once by a snapshot reader and never changed afterwards;
/// all accessors borrow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    vendor_id: u16,
    product_id: u16,
    product: Option<String>,
    manufacturer: Option<String>,
    serial_number: Option<String>,
    bus_number: Option<u8>,
    device_address: Option<u8>,
    port_numbers: Option<Vec<u8>>,
}

impl DeviceRecord {
    /// Create a record knowing only the descriptor IDs
    pub fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
            product: None,
            manufacturer: None,
            serial_number: None,
            bus_number: None,
            device_address: None,
            port_numbers: None,
        }
    }

    /// Set the product string
    pub fn with_product(mut self, product: impl Into<String>) -> Self {
        self.product = non_empty(product.into());
        self
    }

    /// Set the manufacturer string
    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = non_empty(manufacturer.into());
        self
    }

    /// Set the serial number
    pub fn with_serial_number(mut self, serial: impl Into<String>) -> Self {
        self.serial_number = non_empty(serial.into());
        self
    }

    /// Set the bus number and the chain of hub ports leading to the device
    pub fn with_port_path(mut self, bus: u8, ports: Vec<u8>) -> Self {
        self.bus_number = Some(bus);
        self.port_numbers = Some(ports);
        self
    }

    /// Set the bus number and address
    ///
    /// The address is reassigned by the host on every re-enumeration, so it
    /// is informational only and never part of the identity.
    pub fn with_address(mut self, bus: u8, address: u8) -> Self {
        self.bus_number = Some(bus);
        self.device_address = Some(address);
        self
    }

    pub fn vendor_id(&self) -> u16 {
        self.vendor_id
    }

    pub fn product_id(&self) -> u16 {
        self.product_id
    }

    pub fn product(&self) -> Option<&str> {
        self.product.as_deref()
    }

    pub fn manufacturer(&self) -> Option<&str> {
        self.manufacturer.as_deref()
    }

    pub fn serial_number(&self) -> Option<&str> {
        self.serial_number.as_deref()
    }

    pub fn bus_number(&self) -> Option<u8> {
        self.bus_number
    }

    pub fn device_address(&self) -> Option<u8> {
        self.device_address
    }

    pub fn port_numbers(&self) -> Option<&[u8]> {
        self.port_numbers.as_deref()
    }

    /// Human-readable name: product string, else manufacturer, else [`UNKNOWN_NAME`]
    pub fn display_name(&self) -> &str {
        self.product
            .as_deref()
            .or(self.manufacturer.as_deref())
            .unwrap_or(UNKNOWN_NAME)
    }

    /// Resolve the identity key for this record
    pub fn identity(&self) -> DeviceIdentity {
        let port_path = match (self.bus_number, self.port_numbers.as_deref()) {
            (Some(bus), Some(ports)) => Some((bus, ports)),
            _ => None,
        };

        DeviceIdentity::resolve(
            self.vendor_id,
            self.product_id,
            port_path,
            self.serial_number.as_deref(),
        )
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
