//! AX.25 UI frame encoding for KISS transports
//!
//! Only unnumbered information frames (control `0x03`, PID `0xF0`) are
//! produced; anything else received is reported as a decode error.

use crate::types::Frame;
use crate::{GateError, Result};

const ADDRESS_LEN: usize = 7;
const MAX_DIGIPEATERS: usize = 8;
const CONTROL_UI: u8 = 0x03;
const PID_NO_LAYER3: u8 = 0xF0;

const SSID_RESERVED: u8 = 0x60;
const COMMAND_BIT: u8 = 0x80;
const REPEATED_BIT: u8 = 0x80;
const LAST_ADDRESS_BIT: u8 = 0x01;

/// Encode a frame as an AX.25 UI frame (without FCS).
pub fn encode(frame: &Frame) -> Result<Vec<u8>> {
    if frame.path().len() > MAX_DIGIPEATERS {
        return Err(GateError::decode(
            "ax25 address",
            format!("{} digipeaters exceed the limit of {}", frame.path().len(), MAX_DIGIPEATERS),
        ));
    }

    let mut out = Vec::with_capacity(ADDRESS_LEN * (2 + frame.path().len()) + 2 + frame.text().len());
    let last = frame.path().len() + 1;

    encode_address(&mut out, frame.destination(), COMMAND_BIT, false)?;
    encode_address(&mut out, frame.source(), 0, last == 1)?;
    for (i, element) in frame.path().iter().enumerate() {
        let (call, repeated) = match element.strip_suffix('*') {
            Some(call) => (call, REPEATED_BIT),
            None => (element.as_str(), 0),
        };
        encode_address(&mut out, call, repeated, i + 2 == last)?;
    }

    out.push(CONTROL_UI);
    out.push(PID_NO_LAYER3);
    out.extend_from_slice(frame.text().as_bytes());
    Ok(out)
}

/// Decode an AX.25 UI frame (without FCS).
pub fn decode(bytes: &[u8]) -> Result<Frame> {
    let mut addresses = Vec::new();
    let mut offset = 0;

    loop {
        let field = bytes
            .get(offset..offset + ADDRESS_LEN)
            .ok_or_else(|| GateError::decode("ax25 frame", "truncated address field"))?;
        addresses.push(decode_address(field)?);
        offset += ADDRESS_LEN;

        if field[6] & LAST_ADDRESS_BIT != 0 {
            break;
        }
        if addresses.len() == 2 + MAX_DIGIPEATERS {
            return Err(GateError::decode("ax25 frame", "too many addresses"));
        }
    }

    if addresses.len() < 2 {
        return Err(GateError::decode("ax25 frame", "missing source address"));
    }

    match bytes.get(offset..offset + 2) {
        Some([CONTROL_UI, PID_NO_LAYER3]) => {}
        Some([control, pid]) => {
            return Err(GateError::decode(
                "ax25 frame",
                format!("not a UI frame (control {:#04x}, pid {:#04x})", control, pid),
            ));
        }
        _ => return Err(GateError::decode("ax25 frame", "missing control/pid")),
    }

    let text = String::from_utf8_lossy(&bytes[offset + 2..]).into_owned();
    let mut addresses = addresses.into_iter();
    let (destination, _) = addresses.next().unwrap_or_default();
    let (source, _) = addresses.next().unwrap_or_default();
    let path = addresses
        .map(|(call, repeated)| if repeated { format!("{}*", call) } else { call })
        .collect();

    Ok(Frame::new(source, destination, path, text))
}

fn encode_address(out: &mut Vec<u8>, address: &str, flag: u8, last: bool) -> Result<()> {
    let (call, ssid) = match address.split_once('-') {
        Some((call, ssid)) => {
            let ssid: u8 = ssid
                .parse()
                .ok()
                .filter(|s| *s <= 15)
                .ok_or_else(|| GateError::decode("ax25 address", format!("bad SSID in '{}'", address)))?;
            (call, ssid)
        }
        None => (address, 0),
    };

    if call.is_empty()
        || call.len() > 6
        || !call.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
    {
        return Err(GateError::decode("ax25 address", format!("'{}' is not a callsign", address)));
    }

    let mut padded = [b' '; 6];
    padded[..call.len()].copy_from_slice(call.as_bytes());
    out.extend(padded.iter().map(|b| b << 1));

    let mut ssid_byte = SSID_RESERVED | flag | (ssid << 1);
    if last {
        ssid_byte |= LAST_ADDRESS_BIT;
    }
    out.push(ssid_byte);
    Ok(())
}

fn decode_address(field: &[u8]) -> Result<(String, bool)> {
    let call: String = field[..6].iter().map(|b| (b >> 1) as char).collect();
    let call = call.trim_end();
    if call.is_empty() || !call.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(GateError::decode("ax25 address", format!("invalid callsign bytes {:?}", call)));
    }

    let ssid = (field[6] >> 1) & 0x0F;
    let repeated = field[6] & REPEATED_BIT != 0;
    let address = if ssid == 0 { call.to_string() } else { format!("{}-{}", call, ssid) };
    Ok((address, repeated))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_known_layout() {
        let frame = Frame::new("W2GMD-9", "APRS", vec!["WIDE1-1".into()], ">hi");
        let bytes = encode(&frame).unwrap();

        assert_eq!(&bytes[..6], &[b'A' << 1, b'P' << 1, b'R' << 1, b'S' << 1, 0x40, 0x40]);
        assert_eq!(bytes[6], 0xE0);
        assert_eq!(bytes[13], 0x60 | (9 << 1));
        assert_eq!(bytes[20], 0x60 | (1 << 1) | 0x01);
        assert_eq!(&bytes[21..23], &[0x03, 0xF0]);
        assert_eq!(&bytes[23..], b">hi");
    }

    #[test]
    fn repeated_digipeaters_keep_their_star() {
        let frame = Frame::new("K6ABC", "APZ001", vec!["N6XYZ-3*".into(), "WIDE2-1".into()], "x");
        let decoded = decode(&encode(&frame).unwrap()).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn refuses_non_callsign_path_elements() {
        let frame = Frame::new("K6ABC", "APRS", vec!["qAR".into()], "x");
        assert!(matches!(encode(&frame), Err(GateError::Decode { .. })));

        let frame = Frame::new("K6ABC-16", "APRS", vec![], "x");
        assert!(encode(&frame).is_err());
    }

    #[test]
    fn rejects_truncated_and_non_ui_frames() {
        let frame = Frame::new("K6ABC", "APRS", vec![], "x");
        let bytes = encode(&frame).unwrap();

        assert!(decode(&bytes[..10]).is_err());

        let mut not_ui = bytes.clone();
        not_ui[14] = 0x13;
        assert!(decode(&not_ui).is_err());
    }
}
