//! libusb snapshot reader
//!
//! Enumerates the devices currently on the bus and converts each one into a
//! [`DeviceRecord`]. String descriptors are read best-effort: many devices
//! refuse to be opened without elevated permissions, in which case the record
//! is still produced with an unknown name.

use crate::usb::filter::DeviceFilter;
use common::{DeviceRecord, EnumerationError, Snapshot, SnapshotReader};
use rusb::{Context, Device, DeviceDescriptor, DeviceHandle, UsbContext};
use std::time::{Duration, SystemTime};
use tracing::{debug, trace, warn};

/// USB-IF vendor ID used by Linux root hubs
const LINUX_FOUNDATION_VID: u16 = 0x1d6b;
/// bDeviceClass for hubs
const HUB_CLASS: u8 = 0x09;
/// Upper bound for a single string descriptor read
const STRING_READ_TIMEOUT: Duration = Duration::from_millis(200);

/// Snapshot reader backed by libusb
///
/// The libusb context is created on first capture and recreated after a
/// failure, so a host where libusb is temporarily unusable recovers without
/// a restart.
pub struct UsbSnapshotReader {
    context: Option<Context>,
    filters: Vec<DeviceFilter>,
    include_root_hubs: bool,
}

impl UsbSnapshotReader {
    pub fn new(filters: Vec<DeviceFilter>, include_root_hubs: bool) -> Self {
        Self {
            context: None,
            filters,
            include_root_hubs,
        }
    }

    fn context(&mut self) -> Result<&Context, EnumerationError> {
        if self.context.is_none() {
            let context = Context::new().map_err(map_rusb_error)?;
            debug!("Created libusb context");
            self.context = Some(context);
        }

        self.context
            .as_ref()
            .ok_or_else(|| EnumerationError::Unavailable("libusb context missing".to_string()))
    }

    /// Convert one bus entry into a record, or `None` if it is filtered out
    fn read_record(&self, device: &Device<Context>) -> Result<Option<DeviceRecord>, rusb::Error> {
        let descriptor = device.device_descriptor()?;
        let vendor_id = descriptor.vendor_id();
        let product_id = descriptor.product_id();

        if !self.include_root_hubs && is_root_hub(&descriptor) {
            trace!(
                "Skipping root hub on bus {} ({:04x}:{:04x})",
                device.bus_number(),
                vendor_id,
                product_id
            );
            return Ok(None);
        }

        if !DeviceFilter::allows(&self.filters, vendor_id, product_id) {
            trace!(
                "Device ignored by filter: {:04x}:{:04x}",
                vendor_id, product_id
            );
            return Ok(None);
        }

        let mut record = DeviceRecord::new(vendor_id, product_id)
            .with_address(device.bus_number(), device.address());

        match device.port_numbers() {
            Ok(ports) => record = record.with_port_path(device.bus_number(), ports),
            Err(e) => debug!(
                "No port path for {:04x}:{:04x} on bus {}: {}",
                vendor_id,
                product_id,
                device.bus_number(),
                e
            ),
        }

        if let Ok(handle) = device.open() {
            let strings = read_string_descriptors(&handle, &descriptor);
            if let Some(manufacturer) = strings.manufacturer {
                record = record.with_manufacturer(manufacturer);
            }
            if let Some(product) = strings.product {
                record = record.with_product(product);
            }
            if let Some(serial) = strings.serial_number {
                record = record.with_serial_number(serial);
            }
        }

        Ok(Some(record))
    }
}

impl SnapshotReader for UsbSnapshotReader {
    fn capture(&mut self) -> Result<Snapshot, EnumerationError> {
        let captured_at = SystemTime::now();

        let devices = self.context()?.devices();
        let list = match devices {
            Ok(list) => list,
            Err(e) => {
                self.context = None;
                return Err(map_rusb_error(e));
            }
        };

        let mut records = Vec::with_capacity(list.len());
        for device in list.iter() {
            match self.read_record(&device) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => warn!(
                    "Failed to read device on bus {} addr {}: {}",
                    device.bus_number(),
                    device.address(),
                    e
                ),
            }
        }

        let snapshot = Snapshot::from_records(captured_at, records);
        debug!("Captured {} device(s)", snapshot.len());
        Ok(snapshot)
    }
}

fn is_root_hub(descriptor: &DeviceDescriptor) -> bool {
    descriptor.vendor_id() == LINUX_FOUNDATION_VID && descriptor.class_code() == HUB_CLASS
}

#[derive(Default)]
struct DeviceStrings {
    manufacturer: Option<String>,
    product: Option<String>,
    serial_number: Option<String>,
}

fn read_string_descriptors(
    handle: &DeviceHandle<Context>,
    descriptor: &DeviceDescriptor,
) -> DeviceStrings {
    let languages = match handle.read_languages(STRING_READ_TIMEOUT) {
        Ok(languages) => languages,
        Err(e) => {
            trace!("Could not read string languages: {}", e);
            return DeviceStrings::default();
        }
    };
    let Some(language) = languages.first().copied() else {
        return DeviceStrings::default();
    };

    DeviceStrings {
        manufacturer: handle
            .read_manufacturer_string(language, descriptor, STRING_READ_TIMEOUT)
            .ok(),
        product: handle
            .read_product_string(language, descriptor, STRING_READ_TIMEOUT)
            .ok(),
        serial_number: handle
            .read_serial_number_string(language, descriptor, STRING_READ_TIMEOUT)
            .ok(),
    }
}

/// Map a libusb failure onto the enumeration error taxonomy
pub fn map_rusb_error(error: rusb::Error) -> EnumerationError {
    match error {
        rusb::Error::Access => EnumerationError::AccessDenied(error.to_string()),
        rusb::Error::NotSupported
        | rusb::Error::NoDevice
        | rusb::Error::NotFound
        | rusb::Error::Other => {
            EnumerationError::Unavailable(error.to_string())
        }
        other => EnumerationError::Failed(other.to_string()),
    }
}
