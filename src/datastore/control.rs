// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-device bookkeeping behind the auxiliary function codes
//!
//! The control block backs Read Exception Status (0x07), Diagnostics
//! (0x08), the communication event counter and log (0x0B/0x0C), Report
//! Slave Id (0x11), and Read Device Identification (0x2B/0x0E).

use crate::frame::mei::{object_id, ReadDeviceCode};

const MAX_EVENTS: usize = 64;

/// The diagnostic counters of a device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub bus_message: u16,
    pub bus_communication_error: u16,
    pub bus_exception_error: u16,
    pub server_message: u16,
    pub server_no_response: u16,
    pub server_nak: u16,
    pub server_busy: u16,
    pub character_overrun: u16,
}

impl Counters {
    /// One status bit per non-zero counter, used as the exception
    /// status byte.
    #[must_use]
    pub fn summary(&self) -> u8 {
        let flags = [
            self.bus_message,
            self.bus_communication_error,
            self.bus_exception_error,
            self.server_message,
            self.server_no_response,
            self.server_nak,
            self.server_busy,
            self.character_overrun,
        ];
        flags
            .iter()
            .enumerate()
            .fold(0u8, |summary, (bit, &counter)| {
                if counter > 0 {
                    summary | (1 << bit)
                } else {
                    summary
                }
            })
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// The identification objects a device reports via MEI and the
/// identifier blob of Report Slave Id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub vendor_name: String,
    pub product_code: String,
    pub major_minor_revision: String,
    pub vendor_url: String,
    pub product_name: String,
    pub model_name: String,
    pub user_application_name: String,
}

impl DeviceIdentity {
    fn object(&self, id: u8) -> Option<&str> {
        let value = match id {
            object_id::VENDOR_NAME => &self.vendor_name,
            object_id::PRODUCT_CODE => &self.product_code,
            object_id::MAJOR_MINOR_REVISION => &self.major_minor_revision,
            object_id::VENDOR_URL => &self.vendor_url,
            object_id::PRODUCT_NAME => &self.product_name,
            object_id::MODEL_NAME => &self.model_name,
            object_id::USER_APPLICATION_NAME => &self.user_application_name,
            _ => return None,
        };
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    }

    /// The objects selected by a Read Device Identification request.
    #[must_use]
    pub fn objects(&self, read_code: ReadDeviceCode, start_object_id: u8) -> Vec<(u8, Vec<u8>)> {
        let ids: &[u8] = match read_code {
            ReadDeviceCode::Basic => &[
                object_id::VENDOR_NAME,
                object_id::PRODUCT_CODE,
                object_id::MAJOR_MINOR_REVISION,
            ],
            ReadDeviceCode::Regular | ReadDeviceCode::Extended => &[
                object_id::VENDOR_NAME,
                object_id::PRODUCT_CODE,
                object_id::MAJOR_MINOR_REVISION,
                object_id::VENDOR_URL,
                object_id::PRODUCT_NAME,
                object_id::MODEL_NAME,
                object_id::USER_APPLICATION_NAME,
            ],
            ReadDeviceCode::Specific => {
                return self
                    .object(start_object_id)
                    .map(|value| vec![(start_object_id, value.as_bytes().to_vec())])
                    .unwrap_or_default();
            }
        };
        ids.iter()
            .filter(|&&id| id >= start_object_id)
            .filter_map(|&id| self.object(id).map(|value| (id, value.as_bytes().to_vec())))
            .collect()
    }

    /// The device-defined identifier blob of Report Slave Id.
    #[must_use]
    pub fn identifier(&self) -> Vec<u8> {
        let fields: Vec<&str> = [
            self.vendor_name.as_str(),
            self.product_code.as_str(),
            self.major_minor_revision.as_str(),
        ]
        .into_iter()
        .filter(|field| !field.is_empty())
        .collect();
        if fields.is_empty() {
            b"modbus-stack".to_vec()
        } else {
            fields.join("-").into_bytes()
        }
    }
}

/// Mutable device state consulted and updated by request dispatch.
#[derive(Debug, Clone, Default)]
pub struct ControlBlock {
    pub counters: Counters,
    pub diagnostic_register: u16,
    /// While set, the device processes requests without answering.
    pub listen_only: bool,
    /// The ASCII input frame delimiter, `\n` unless changed.
    pub delimiter: u8,
    pub identity: DeviceIdentity,
    event_count: u16,
    events: Vec<u8>,
}

impl ControlBlock {
    #[must_use]
    pub fn new(identity: DeviceIdentity) -> Self {
        Self {
            delimiter: b'\n',
            identity,
            ..Self::default()
        }
    }

    /// Record a communication event, newest first.
    pub fn record_event(&mut self, event: u8) {
        self.events.insert(0, event);
        self.events.truncate(MAX_EVENTS);
        self.event_count = self.event_count.wrapping_add(1);
    }

    #[must_use]
    pub fn event_count(&self) -> u16 {
        self.event_count
    }

    #[must_use]
    pub fn events(&self) -> &[u8] {
        &self.events
    }

    /// Clear counters, the diagnostic register and the event log.
    pub fn restart_communications(&mut self, clear_log: bool) {
        self.counters.reset();
        self.diagnostic_register = 0;
        self.listen_only = false;
        if clear_log {
            self.events.clear();
            self.event_count = 0;
        }
    }

    pub fn clear_counters(&mut self) {
        self.counters.reset();
        self.diagnostic_register = 0;
    }
}
