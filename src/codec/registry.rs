// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Registration of custom function codes
//!
//! Every codec owns a [`PduRegistry`]. The built-in catalog is always
//! available; registered entries are consulted first, so they can override
//! built-in function codes or add new ones. Registries are per codec
//! instance, registrations never leak across connections.

use std::{collections::HashMap, fmt, io, sync::Arc};

use bytes::Bytes;

use crate::{
    frame::{ExceptionResponse, FunctionCode, Request, Response, ResponsePdu},
    Error,
};

/// Decode hook for a custom request PDU (function code included).
pub type RequestDecoder = Arc<dyn Fn(Bytes) -> io::Result<Request> + Send + Sync>;

/// Decode hook for a custom response PDU (function code included).
pub type ResponseDecoder = Arc<dyn Fn(Bytes) -> io::Result<Response> + Send + Sync>;

type LenFn = Arc<dyn Fn(&[u8]) -> Option<usize> + Send + Sync>;

/// How to derive the total length of a PDU from its leading bytes.
///
/// The RTU and TLS framers need this before the full frame has arrived:
/// the frame carries no length prefix, so the expected size is derived
/// from the function code and, for variable-length PDUs, a byte-count
/// field at a known position.
#[derive(Clone)]
pub enum FrameLen {
    /// The PDU always has this many bytes, including the function code.
    Fixed(usize),
    /// The PDU carries an 8 bit byte count at this offset; the total
    /// length is `offset + 1 + byte_count`.
    ByteCountAt(usize),
    /// Compute the length from the partial PDU. `None` requests more data.
    Dynamic(LenFn),
}

impl FrameLen {
    pub(crate) fn pdu_len(&self, pdu: &[u8]) -> Option<usize> {
        match self {
            Self::Fixed(len) => Some(*len),
            Self::ByteCountAt(pos) => pdu.get(*pos).map(|&cnt| pos + 1 + usize::from(cnt)),
            Self::Dynamic(len_fn) => len_fn(pdu),
        }
    }
}

impl fmt::Debug for FrameLen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(len) => f.debug_tuple("Fixed").field(len).finish(),
            Self::ByteCountAt(pos) => f.debug_tuple("ByteCountAt").field(pos).finish(),
            Self::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

/// A user-defined (request, response) pair for one function code.
#[derive(Clone)]
pub struct CustomFunction {
    /// The function code to register, within `1..=0x7F`.
    pub function_code: FunctionCode,
    /// An optional 16 bit sub-function code directly after the function
    /// code, forming a second level of dispatch.
    pub sub_function: Option<u16>,
    pub request_len: FrameLen,
    pub response_len: FrameLen,
    pub decode_request: RequestDecoder,
    pub decode_response: ResponseDecoder,
}

impl fmt::Debug for CustomFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomFunction")
            .field("function_code", &self.function_code)
            .field("sub_function", &self.sub_function)
            .field("request_len", &self.request_len)
            .field("response_len", &self.response_len)
            .finish_non_exhaustive()
    }
}

/// Decoder table mapping function codes to PDU constructors.
#[derive(Debug, Default)]
pub struct PduRegistry {
    custom: HashMap<(FunctionCode, Option<u16>), CustomFunction>,
}

impl PduRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a custom (request, response) pair.
    ///
    /// An entry that was registered before under the same function and
    /// sub-function code is replaced.
    pub fn register(&mut self, function: CustomFunction) -> Result<(), Error> {
        if function.function_code == 0 || function.function_code >= 0x80 {
            return Err(Error::Registration(
                "custom function codes must be within 1..=0x7F",
            ));
        }
        self.custom
            .insert((function.function_code, function.sub_function), function);
        Ok(())
    }

    fn lookup(&self, pdu: &[u8]) -> Option<&CustomFunction> {
        let fn_code = *pdu.first()?;
        if pdu.len() >= 3 {
            let sub = u16::from_be_bytes([pdu[1], pdu[2]]);
            if let Some(function) = self.custom.get(&(fn_code, Some(sub))) {
                return Some(function);
            }
        }
        self.custom.get(&(fn_code, None))
    }

    fn is_registered(&self, fn_code: FunctionCode) -> bool {
        self.custom.keys().any(|(code, _)| *code == fn_code)
    }

    /// Expected total length of the request PDU starting at `pdu[0]`.
    ///
    /// `Ok(None)` means that more data is required to tell.
    pub(crate) fn request_pdu_len(&self, pdu: &[u8]) -> io::Result<Option<usize>> {
        let Some(&fn_code) = pdu.first() else {
            return Ok(None);
        };
        if let Some(function) = self.lookup(pdu) {
            return Ok(function.request_len.pdu_len(pdu));
        }
        match builtin_request_len(fn_code) {
            Some(rule) => Ok(rule.pdu_len(pdu)),
            None => Err(invalid_function_code(fn_code)),
        }
    }

    /// Expected total length of the response PDU starting at `pdu[0]`.
    pub(crate) fn response_pdu_len(&self, pdu: &[u8]) -> io::Result<Option<usize>> {
        let Some(&fn_code) = pdu.first() else {
            return Ok(None);
        };
        if fn_code >= 0x80 {
            let base = fn_code & 0x7F;
            if builtin_request_len(base).is_some() || self.is_registered(base) {
                return Ok(Some(2));
            }
            return Err(invalid_function_code(fn_code));
        }
        if let Some(function) = self.lookup(pdu) {
            return Ok(function.response_len.pdu_len(pdu));
        }
        match builtin_response_len(fn_code) {
            Some(rule) => Ok(rule.pdu_len(pdu)),
            None => Err(invalid_function_code(fn_code)),
        }
    }

    /// Decode one complete request PDU.
    pub(crate) fn decode_request(&self, pdu: Bytes) -> io::Result<Request> {
        if let Some(function) = self.lookup(&pdu) {
            return (function.decode_request)(pdu);
        }
        Request::try_from(pdu)
    }

    /// Decode one complete response PDU.
    ///
    /// Function codes with the error bit set always decode as an
    /// [`ExceptionResponse`], custom registrations included.
    pub(crate) fn decode_response(&self, pdu: Bytes) -> io::Result<ResponsePdu> {
        let Some(&fn_code) = pdu.first() else {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "Empty response PDU",
            ));
        };
        if fn_code >= 0x80 {
            return Ok(ExceptionResponse::try_from(pdu)?.into());
        }
        if let Some(function) = self.lookup(&pdu) {
            return (function.decode_response)(pdu).map(Into::into);
        }
        ResponsePdu::try_from(pdu)
    }
}

fn invalid_function_code(fn_code: FunctionCode) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("Invalid function code: 0x{fn_code:0>2X}"),
    )
}

fn builtin_request_len(fn_code: FunctionCode) -> Option<FrameLen> {
    let rule = match fn_code {
        0x01..=0x06 => FrameLen::Fixed(5),
        0x07 | 0x0B | 0x0C | 0x11 => FrameLen::Fixed(1),
        0x08 => FrameLen::Fixed(5),
        0x0F | 0x10 => FrameLen::ByteCountAt(5),
        0x14 | 0x15 => FrameLen::ByteCountAt(1),
        0x16 => FrameLen::Fixed(7),
        0x17 => FrameLen::ByteCountAt(9),
        0x18 => FrameLen::Fixed(3),
        0x2B => FrameLen::Fixed(4),
        _ => return None,
    };
    Some(rule)
}

fn builtin_response_len(fn_code: FunctionCode) -> Option<FrameLen> {
    let rule = match fn_code {
        0x01..=0x04 | 0x0C | 0x11 | 0x14 | 0x15 | 0x17 => FrameLen::ByteCountAt(1),
        0x05 | 0x06 | 0x0B | 0x0F | 0x10 => FrameLen::Fixed(5),
        0x07 => FrameLen::Fixed(2),
        0x08 => FrameLen::Fixed(5),
        0x16 => FrameLen::Fixed(7),
        0x18 => FrameLen::Dynamic(Arc::new(|pdu: &[u8]| {
            if pdu.len() < 3 {
                return None;
            }
            let byte_count = u16::from_be_bytes([pdu[1], pdu[2]]);
            Some(3 + usize::from(byte_count))
        })),
        0x2B => FrameLen::Dynamic(Arc::new(|pdu: &[u8]| {
            // Walk the identification objects to find the end of the PDU.
            if pdu.len() < 7 {
                return None;
            }
            let number_of_objects = usize::from(pdu[6]);
            let mut len = 7;
            for _ in 0..number_of_objects {
                let object_len = usize::from(*pdu.get(len + 1)?);
                len += 2 + object_len;
            }
            Some(len)
        })),
        _ => return None,
    };
    Some(rule)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn custom_function() -> CustomFunction {
        CustomFunction {
            function_code: 0x41,
            sub_function: None,
            request_len: FrameLen::Fixed(3),
            response_len: FrameLen::ByteCountAt(1),
            decode_request: Arc::new(|pdu| Ok(Request::Custom(pdu[0], pdu[1..].to_vec()))),
            decode_response: Arc::new(|pdu| Ok(Response::Custom(pdu[0], pdu[1..].to_vec()))),
        }
    }

    #[test]
    fn builtin_request_lengths() {
        let registry = PduRegistry::new();
        assert_eq!(
            registry
                .request_pdu_len(&[0x01, 0, 0, 0, 1])
                .unwrap(),
            Some(5)
        );
        assert_eq!(registry.request_pdu_len(&[0x07]).unwrap(), Some(1));
        assert_eq!(registry.request_pdu_len(&[0x11]).unwrap(), Some(1));
        assert_eq!(registry.request_pdu_len(&[0x16]).unwrap(), Some(7));
        assert_eq!(registry.request_pdu_len(&[0x2B]).unwrap(), Some(4));
        // Byte count not yet received
        assert_eq!(
            registry.request_pdu_len(&[0x0F, 0, 0, 0, 10]).unwrap(),
            None
        );
        assert_eq!(
            registry
                .request_pdu_len(&[0x0F, 0, 0, 0, 10, 2])
                .unwrap(),
            Some(8)
        );
        assert_eq!(registry.request_pdu_len(&[0x14, 14]).unwrap(), Some(16));
        assert!(registry.request_pdu_len(&[0x66]).is_err());
    }

    #[test]
    fn builtin_response_lengths() {
        let registry = PduRegistry::new();
        assert_eq!(registry.response_pdu_len(&[0x01, 99]).unwrap(), Some(101));
        assert_eq!(registry.response_pdu_len(&[0x05]).unwrap(), Some(5));
        assert_eq!(registry.response_pdu_len(&[0x07]).unwrap(), Some(2));
        assert_eq!(registry.response_pdu_len(&[0x0B]).unwrap(), Some(5));
        // FIFO byte count is 16 bit
        assert_eq!(registry.response_pdu_len(&[0x18, 0x01]).unwrap(), None);
        assert_eq!(
            registry.response_pdu_len(&[0x18, 0x01, 0x00]).unwrap(),
            Some(259)
        );
        // Device identification length requires walking the objects
        assert_eq!(
            registry
                .response_pdu_len(&[0x2B, 0x0E, 0x01, 0x83, 0x00, 0x00, 0x01, 0x00])
                .unwrap(),
            None
        );
        assert_eq!(
            registry
                .response_pdu_len(&[0x2B, 0x0E, 0x01, 0x83, 0x00, 0x00, 0x01, 0x00, 0x02])
                .unwrap(),
            Some(11)
        );
        assert_eq!(
            registry
                .response_pdu_len(&[
                    0x2B, 0x0E, 0x01, 0x83, 0x00, 0x00, 0x01, 0x00, 0x02, 0x41, 0x42
                ])
                .unwrap(),
            Some(11)
        );
        // Exceptions are always two bytes
        assert_eq!(registry.response_pdu_len(&[0x83, 0x02]).unwrap(), Some(2));
        assert!(registry.response_pdu_len(&[0xE6]).is_err());
    }

    #[test]
    fn register_custom_function() {
        let mut registry = PduRegistry::new();
        assert!(registry.request_pdu_len(&[0x41, 0, 0]).is_err());

        registry.register(custom_function()).unwrap();
        assert_eq!(registry.request_pdu_len(&[0x41, 0, 0]).unwrap(), Some(3));
        assert_eq!(
            registry.response_pdu_len(&[0x41, 0x02]).unwrap(),
            Some(4)
        );
        // Exception responses to custom functions frame as usual
        assert_eq!(registry.response_pdu_len(&[0xC1, 0x01]).unwrap(), Some(2));

        let req = registry
            .decode_request(Bytes::from(vec![0x41, 0xAB, 0xCD]))
            .unwrap();
        assert_eq!(req, Request::Custom(0x41, vec![0xAB, 0xCD]));
    }

    #[test]
    fn register_overrides_duplicates() {
        let mut registry = PduRegistry::new();
        registry.register(custom_function()).unwrap();
        let mut replacement = custom_function();
        replacement.request_len = FrameLen::Fixed(9);
        registry.register(replacement).unwrap();
        assert_eq!(registry.request_pdu_len(&[0x41, 0, 0]).unwrap(), Some(9));
    }

    #[test]
    fn register_rejects_reserved_codes() {
        let mut registry = PduRegistry::new();
        let mut function = custom_function();
        function.function_code = 0x00;
        assert!(registry.register(function).is_err());
        let mut function = custom_function();
        function.function_code = 0x80;
        assert!(registry.register(function).is_err());
    }

    #[test]
    fn sub_function_dispatch() {
        let mut registry = PduRegistry::new();
        let mut function = custom_function();
        function.sub_function = Some(0x0102);
        function.request_len = FrameLen::Fixed(5);
        registry.register(function).unwrap();
        registry.register(custom_function()).unwrap();

        // Matching sub-function code selects the specialized entry
        assert_eq!(
            registry.request_pdu_len(&[0x41, 0x01, 0x02]).unwrap(),
            Some(5)
        );
        // Any other sub-function code falls back to the generic entry
        assert_eq!(
            registry.request_pdu_len(&[0x41, 0x99, 0x99]).unwrap(),
            Some(3)
        );
    }

    #[test]
    fn exception_decodes_even_for_custom_codes() {
        let mut registry = PduRegistry::new();
        registry.register(custom_function()).unwrap();
        let pdu = registry
            .decode_response(Bytes::from(vec![0xC1, 0x02]))
            .unwrap();
        assert!(pdu.0.is_err());
    }
}
