//! Minimal CoAP encoder for CoIoT style announce messages.
//! Only what a non-confirmable multicast publish needs: header, options, payload.

use std::net::{Ipv4Addr, SocketAddrV4};

/// CoAP "All CoAP Nodes" IPv4 group used by CoIoT
pub const COIOT_MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(224, 0, 1, 187);
pub const COIOT_PORT: u16 = 5683;

pub const OPTION_URI_PATH: u16 = 11;
/// CoIoT global device id, `<model>#<mac>#<gen>`
pub const OPTION_GLOBAL_DEVID: u16 = 3332;
/// CoIoT status validity in seconds
pub const OPTION_STATUS_VALIDITY: u16 = 3412;
pub const OPTION_STATUS_SERIAL: u16 = 3420;

const VERSION: u8 = 1;
const TYPE_NON_CONFIRMABLE: u8 = 1;
/// Code 0.30, the CoIoT status publish
const CODE_COIOT_STATUS: u8 = 30;
const PAYLOAD_MARKER: u8 = 0xFF;

pub fn coiot_destination() -> SocketAddrV4 {
    SocketAddrV4::new(COIOT_MULTICAST_GROUP, COIOT_PORT)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoapOption {
    pub number: u16,
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoapMessage {
    pub message_id: u16,
    pub code: u8,
    pub options: Vec<CoapOption>,
    pub payload: Vec<u8>,
}

impl CoapMessage {
    /// Non-confirmable status publish, no token. Nothing is expected back.
    pub fn coiot_announce(
        message_id: u16,
        global_devid: &str,
        validity_secs: u16,
        serial: u16,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            message_id,
            code: CODE_COIOT_STATUS,
            options: vec![
                CoapOption {
                    number: OPTION_URI_PATH,
                    value: b"cit".to_vec(),
                },
                CoapOption {
                    number: OPTION_URI_PATH,
                    value: b"s".to_vec(),
                },
                CoapOption {
                    number: OPTION_GLOBAL_DEVID,
                    value: global_devid.as_bytes().to_vec(),
                },
                CoapOption {
                    number: OPTION_STATUS_VALIDITY,
                    value: validity_secs.to_be_bytes().to_vec(),
                },
                CoapOption {
                    number: OPTION_STATUS_SERIAL,
                    value: serial.to_be_bytes().to_vec(),
                },
            ],
            payload,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.payload.len() + 32);
        out.push((VERSION << 6) | (TYPE_NON_CONFIRMABLE << 4));
        out.push(self.code);
        out.extend_from_slice(&self.message_id.to_be_bytes());

        // Options must go out in ascending order, each number as a delta to the previous one
        let mut options: Vec<&CoapOption> = self.options.iter().collect();
        options.sort_by_key(|o| o.number);
        let mut previous = 0u16;
        for option in options {
            encode_option(&mut out, option.number - previous, &option.value);
            previous = option.number;
        }

        if !self.payload.is_empty() {
            out.push(PAYLOAD_MARKER);
            out.extend_from_slice(&self.payload);
        }
        out
    }
}

/// Splits a delta or length into its 4-bit nibble and extended bytes
fn nibble(value: usize) -> (u8, Vec<u8>) {
    if value < 13 {
        (value as u8, Vec::new())
    } else if value < 269 {
        (13, vec![(value - 13) as u8])
    } else {
        (14, ((value - 269) as u16).to_be_bytes().to_vec())
    }
}

fn encode_option(out: &mut Vec<u8>, delta: u16, value: &[u8]) {
    let (delta_nibble, delta_ext) = nibble(delta as usize);
    let (len_nibble, len_ext) = nibble(value.len());
    out.push((delta_nibble << 4) | len_nibble);
    out.extend_from_slice(&delta_ext);
    out.extend_from_slice(&len_ext);
    out.extend_from_slice(value);
}
