//! SSH data type encoding (RFC 4251 Section 5).
//!
//! Helpers shared by every message codec: `byte`, `boolean`, `uint32`,
//! `string` and `name-list`. Readers advance an explicit offset and fail with
//! [`TetherError::Protocol`] on truncated input.

use bytes::{BufMut, BytesMut};
use tether_platform::{TetherError, TetherResult};

pub(crate) fn write_string(buf: &mut BytesMut, s: &str) {
    write_bytes(buf, s.as_bytes());
}

pub(crate) fn write_bytes(buf: &mut BytesMut, bytes: &[u8]) {
    buf.put_u32(bytes.len() as u32);
    buf.put_slice(bytes);
}

pub(crate) fn write_bool(buf: &mut BytesMut, value: bool) {
    buf.put_u8(u8::from(value));
}

pub(crate) fn write_name_list(buf: &mut BytesMut, names: &[String]) {
    write_string(buf, &names.join(","));
}

pub(crate) fn read_u8(data: &[u8], offset: &mut usize) -> TetherResult<u8> {
    let byte = *data.get(*offset).ok_or_else(|| {
        TetherError::Protocol(format!("Cannot read byte at offset {}", offset))
    })?;
    *offset += 1;
    Ok(byte)
}

pub(crate) fn read_bool(data: &[u8], offset: &mut usize) -> TetherResult<bool> {
    Ok(read_u8(data, offset)? != 0)
}

pub(crate) fn read_u32(data: &[u8], offset: &mut usize) -> TetherResult<u32> {
    if *offset + 4 > data.len() {
        return Err(TetherError::Protocol(format!(
            "Cannot read length at offset {}",
            offset
        )));
    }

    let value = u32::from_be_bytes([
        data[*offset],
        data[*offset + 1],
        data[*offset + 2],
        data[*offset + 3],
    ]);
    *offset += 4;

    Ok(value)
}

pub(crate) fn read_bytes(data: &[u8], offset: &mut usize) -> TetherResult<Vec<u8>> {
    let length = read_u32(data, offset)? as usize;

    if *offset + length > data.len() {
        return Err(TetherError::Protocol(format!(
            "Data truncated: expected {} bytes at offset {}",
            length, offset
        )));
    }

    let bytes = data[*offset..*offset + length].to_vec();
    *offset += length;

    Ok(bytes)
}

pub(crate) fn read_string(data: &[u8], offset: &mut usize) -> TetherResult<String> {
    let bytes = read_bytes(data, offset)?;
    String::from_utf8(bytes)
        .map_err(|_| TetherError::Protocol("String contains invalid UTF-8".to_string()))
}

pub(crate) fn read_name_list(data: &[u8], offset: &mut usize) -> TetherResult<Vec<String>> {
    let names = read_string(data, offset)?;
    if names.is_empty() {
        return Ok(Vec::new());
    }
    Ok(names.split(',').map(String::from).collect())
}

/// Checks the leading message number byte of a payload.
pub(crate) fn expect_message(data: &[u8], number: u8, name: &str) -> TetherResult<()> {
    match data.first() {
        None => Err(TetherError::Protocol(format!("{} message is empty", name))),
        Some(&byte) if byte != number => Err(TetherError::Protocol(format!(
            "Invalid message type: expected {} ({}), got {}",
            number, name, byte
        ))),
        Some(_) => Ok(()),
    }
}
