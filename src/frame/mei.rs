// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Encapsulated interface transport (function code 0x2B)
//!
//! Only MEI type 0x0E (Read Device Identification) is part of the catalog.

/// The MEI type for Read Device Identification.
pub(crate) const READ_DEVICE_ID: u8 = 0x0E;

/// Which category of identification objects to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadDeviceCode {
    /// Objects 0x00-0x02 (vendor name, product code, revision).
    Basic = 0x01,
    /// Objects 0x00-0x06.
    Regular = 0x02,
    /// All objects, including device specific ones.
    Extended = 0x03,
    /// A single object, selected by the object id of the request.
    Specific = 0x04,
}

impl ReadDeviceCode {
    pub(crate) fn new(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Self::Basic),
            0x02 => Some(Self::Regular),
            0x03 => Some(Self::Extended),
            0x04 => Some(Self::Specific),
            _ => None,
        }
    }
}

/// Standard identification object ids.
pub mod object_id {
    pub const VENDOR_NAME: u8 = 0x00;
    pub const PRODUCT_CODE: u8 = 0x01;
    pub const MAJOR_MINOR_REVISION: u8 = 0x02;
    pub const VENDOR_URL: u8 = 0x03;
    pub const PRODUCT_NAME: u8 = 0x04;
    pub const MODEL_NAME: u8 = 0x05;
    pub const USER_APPLICATION_NAME: u8 = 0x06;
}

/// The payload of a Read Device Identification response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInformation {
    pub read_code: ReadDeviceCode,
    /// Conformity level of the device (0x83 = extended identification,
    /// both stream and individual access).
    pub conformity: u8,
    /// `true` if further objects are available under `next_object_id`.
    pub more_follows: bool,
    pub next_object_id: u8,
    /// `(object_id, raw value)` pairs in transmission order.
    pub objects: Vec<(u8, Vec<u8>)>,
}

impl DeviceInformation {
    #[must_use]
    pub fn new(read_code: ReadDeviceCode, objects: Vec<(u8, Vec<u8>)>) -> Self {
        Self {
            read_code,
            conformity: 0x83,
            more_follows: false,
            next_object_id: 0x00,
            objects,
        }
    }

    /// Look up an object value by its id.
    #[must_use]
    pub fn object(&self, object_id: u8) -> Option<&[u8]> {
        self.objects
            .iter()
            .find(|(id, _)| *id == object_id)
            .map(|(_, value)| value.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_device_codes() {
        assert_eq!(ReadDeviceCode::new(0x01), Some(ReadDeviceCode::Basic));
        assert_eq!(ReadDeviceCode::new(0x04), Some(ReadDeviceCode::Specific));
        assert_eq!(ReadDeviceCode::new(0x00), None);
        assert_eq!(ReadDeviceCode::new(0x05), None);
    }

    #[test]
    fn object_lookup() {
        let info = DeviceInformation::new(
            ReadDeviceCode::Basic,
            vec![
                (object_id::VENDOR_NAME, b"slowtec".to_vec()),
                (object_id::PRODUCT_CODE, b"MS".to_vec()),
            ],
        );
        assert_eq!(info.object(object_id::VENDOR_NAME), Some(&b"slowtec"[..]));
        assert_eq!(info.object(object_id::MODEL_NAME), None);
    }
}
