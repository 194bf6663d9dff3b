pub mod block_device;

use std::time::Duration;

use rusb::{ConfigDescriptor, Device, DeviceHandle, Direction, GlobalContext, TransferType};
use thiserror::Error;

use crate::transport::{BulkOnly, DEFAULT_TIMEOUT, Endpoints};
use block_device::BlockDevice;

const CLASS_MASS_STORAGE: u8 = 0x08;
const SUBCLASS_SCSI_TRANSPARENT: u8 = 0x06;
const PROTOCOL_BULK_ONLY: u8 = 0x50;

#[derive(Error, Debug)]
pub enum UsbMassStorageError {
    #[error("failed to get usb devices from rusb")]
    FailedToGetUsbDevices(#[source] rusb::Error),
    #[error("no bulk-only mass storage device with vendor id {vendor_id:#06x} and product id {product_id:?}")]
    DeviceNotFound {
        vendor_id: u16,
        product_id: Option<u16>,
    },
    #[error("failed to open usb devices from rusb")]
    FailedToOpenUsbDevice(#[source] rusb::Error),
    #[error("failed to claim interface {interface}")]
    FailedToClaimInterface {
        interface: u8,
        #[source]
        source: rusb::Error,
    },
}

/// A bulk-only mass storage device, `Closed` until [`open`](UsbMassStorage::open) is called.
#[derive(Debug, Clone)]
pub struct UsbMassStorage<S = Closed> {
    pub device: Device<GlobalContext>,
    pub vendor_id: u16,
    pub product_id: u16,
    pub device_config_number: u8,
    pub interface: BulkOnlyInterface,
    pub extra: S,
}

#[derive(Debug)]
pub struct Opened {
    pub block_device: BlockDevice<DeviceHandle<GlobalContext>>,
    interface_number: u8,
}

#[derive(Debug, Clone)]
pub struct Closed;

/// The Bulk-Only (protocol 0x50) interface of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkOnlyInterface {
    pub in_address: u8,
    pub in_max_size: u16,
    pub out_address: u8,
    pub out_max_size: u16,
    pub interface_number: u8,
}

impl BulkOnlyInterface {
    pub fn endpoints(&self) -> Endpoints {
        Endpoints {
            bulk_in: self.in_address,
            bulk_out: self.out_address,
        }
    }

    fn from_config(config: &ConfigDescriptor) -> Option<Self> {
        for interface in config.interfaces() {
            for interface_descriptor in interface.descriptors() {
                // Skip anything that is not mass storage with the SCSI transparent command set
                if interface_descriptor.class_code() != CLASS_MASS_STORAGE
                    || interface_descriptor.sub_class_code() != SUBCLASS_SCSI_TRANSPARENT
                {
                    continue;
                }

                // Check if not just a USB Mass Storage Class Bulk-Only (BBB) Transport
                if interface_descriptor.protocol_code() != PROTOCOL_BULK_ONLY {
                    continue;
                }

                let mut transfer_out_info = None;
                let mut transfer_in_info = None;

                for endpoint in interface_descriptor.endpoint_descriptors() {
                    if endpoint.transfer_type() != TransferType::Bulk {
                        continue;
                    }

                    let info = Some((endpoint.address(), endpoint.max_packet_size()));
                    match endpoint.direction() {
                        Direction::In => transfer_in_info = info,
                        Direction::Out => transfer_out_info = info,
                    }
                }

                if let Some(in_info) = transfer_in_info
                    && let Some(out_info) = transfer_out_info
                {
                    return Some(Self {
                        in_address: in_info.0,
                        in_max_size: in_info.1,
                        out_address: out_info.0,
                        out_max_size: out_info.1,
                        interface_number: interface_descriptor.interface_number(),
                    });
                }
            }
        }

        None
    }
}

impl UsbMassStorage {
    /// Every attached device exposing a Bulk-Only mass storage interface.
    pub fn list() -> Result<Vec<UsbMassStorage<Closed>>, UsbMassStorageError> {
        let mut devices = Vec::new();
        let rusb_devices = rusb::devices().map_err(UsbMassStorageError::FailedToGetUsbDevices)?;

        for device in rusb_devices.iter() {
            let desc = match device.device_descriptor() {
                Ok(desc) => desc,
                Err(_) => continue,
            };

            for i in 0..desc.num_configurations() {
                let config_desc = match device.config_descriptor(i) {
                    Ok(config) => config,
                    Err(_) => continue,
                };

                if let Some(interface) = BulkOnlyInterface::from_config(&config_desc) {
                    devices.push(UsbMassStorage {
                        device: device.clone(),
                        vendor_id: desc.vendor_id(),
                        product_id: desc.product_id(),
                        device_config_number: config_desc.number(),
                        interface,
                        extra: Closed,
                    });
                    break;
                }
            }
        }

        Ok(devices)
    }

    /// The first listed device matching `vendor_id` and, if given, `product_id`.
    pub fn find(
        vendor_id: u16,
        product_id: Option<u16>,
    ) -> Result<UsbMassStorage<Closed>, UsbMassStorageError> {
        Self::list()?
            .into_iter()
            .find(|usb| {
                usb.vendor_id == vendor_id && product_id.is_none_or(|pid| usb.product_id == pid)
            })
            .ok_or(UsbMassStorageError::DeviceNotFound {
                vendor_id,
                product_id,
            })
    }
}

impl UsbMassStorage<Closed> {
    pub fn open(self) -> Result<UsbMassStorage<Opened>, UsbMassStorageError> {
        self.open_with_timeout(DEFAULT_TIMEOUT)
    }

    /// Open the device, claim its Bulk-Only interface and clear stale halts.
    pub fn open_with_timeout(
        self,
        timeout: Duration,
    ) -> Result<UsbMassStorage<Opened>, UsbMassStorageError> {
        let handle = self
            .device
            .open()
            .map_err(UsbMassStorageError::FailedToOpenUsbDevice)?;

        handle.set_auto_detach_kernel_driver(true).ok();

        handle
            .set_active_configuration(self.device_config_number)
            .ok();

        let interface_number = self.interface.interface_number;
        handle.claim_interface(interface_number).map_err(|source| {
            UsbMassStorageError::FailedToClaimInterface {
                interface: interface_number,
                source,
            }
        })?;
        handle.set_alternate_setting(interface_number, 0).ok();

        // Clear any leftover halts from a previous session.
        handle.clear_halt(self.interface.in_address).ok();
        handle.clear_halt(self.interface.out_address).ok();

        log::debug!(
            "opened {:04x}:{:04x} interface {interface_number} (in {:#04x}, out {:#04x})",
            self.vendor_id,
            self.product_id,
            self.interface.in_address,
            self.interface.out_address
        );

        let bot = BulkOnly::new(handle, self.interface.endpoints()).with_timeout(timeout);

        Ok(UsbMassStorage::<Opened> {
            device: self.device,
            vendor_id: self.vendor_id,
            product_id: self.product_id,
            device_config_number: self.device_config_number,
            interface: self.interface,
            extra: Opened {
                block_device: BlockDevice::new(bot),
                interface_number,
            },
        })
    }
}

impl UsbMassStorage<Opened> {
    /// Close the channel
    pub fn close(self) -> UsbMassStorage<Closed> {
        UsbMassStorage::<Closed> {
            device: self.device,
            vendor_id: self.vendor_id,
            product_id: self.product_id,
            device_config_number: self.device_config_number,
            interface: self.interface,
            extra: Closed,
        }
    }

    pub fn block_device(&mut self) -> &mut BlockDevice<DeviceHandle<GlobalContext>> {
        &mut self.extra.block_device
    }

    /// Port reset, for when a session has lost track of the device.
    ///
    /// The device re-enumerates; reopen it afterwards.
    pub fn reset(mut self) -> Result<UsbMassStorage<Closed>, UsbMassStorageError> {
        self.extra
            .block_device
            .bot_mut()
            .transport_mut()
            .reset()
            .map_err(UsbMassStorageError::FailedToOpenUsbDevice)?;
        Ok(self.close())
    }
}

impl Drop for Opened {
    fn drop(&mut self) {
        let _ = self
            .block_device
            .bot_mut()
            .transport_mut()
            .release_interface(self.interface_number);
    }
}
