//! Text decoding for string fields
//!
//! Decodes raw bytes into text according to the encoding label carried by a
//! field or inherited from the enclosing type's meta. ASCII, Latin-1, UTF-8
//! and UTF-16 are handled inline; other encodings go through encoding_rs.

use crate::error::Error;
use encoding_rs::{EUC_JP, SHIFT_JIS};

/// Decode bytes using the named encoding. Labels are matched
/// case-insensitively with `-`/`_` treated alike.
pub fn decode(bytes: &[u8], label: &str) -> Result<String, Error> {
    let norm = label.to_ascii_lowercase().replace('_', "-");
    match norm.as_str() {
        "ascii" | "us-ascii" => decode_ascii(bytes),
        "utf-8" | "utf8" => decode_utf8(bytes),
        "latin-1" | "latin1" | "iso-8859-1" | "iso8859-1" => Ok(decode_latin1(bytes)),
        "utf-16le" | "utf16le" => decode_utf16(bytes, false),
        "utf-16be" | "utf16be" => decode_utf16(bytes, true),
        "shift-jis" | "shift-jis-2004" | "sjis" => decode_with_encoding_rs(bytes, SHIFT_JIS, label),
        "euc-jp" | "eucjp" => decode_with_encoding_rs(bytes, EUC_JP, label),
        _ => Err(Error::parse(format!("unknown encoding '{}'", label))),
    }
}

fn decode_ascii(bytes: &[u8]) -> Result<String, Error> {
    for (i, &b) in bytes.iter().enumerate() {
        if b >= 0x80 {
            return Err(Error::parse(format!(
                "invalid ASCII byte {:#04x} at offset {}",
                b, i
            )));
        }
    }
    Ok(bytes.iter().map(|&b| b as char).collect())
}

fn decode_utf8(bytes: &[u8]) -> Result<String, Error> {
    String::from_utf8(bytes.to_vec())
        .map_err(|e| Error::parse(format!("invalid UTF-8 sequence at offset {}", e.utf8_error().valid_up_to())))
}

fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

fn decode_utf16(bytes: &[u8], big_endian: bool) -> Result<String, Error> {
    if bytes.len() % 2 != 0 {
        return Err(Error::parse("odd byte count for UTF-16 string"));
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| {
            let arr = [pair[0], pair[1]];
            if big_endian {
                u16::from_be_bytes(arr)
            } else {
                u16::from_le_bytes(arr)
            }
        })
        .collect();
    String::from_utf16(&units).map_err(|_| Error::parse("invalid UTF-16 sequence"))
}

fn decode_with_encoding_rs(
    bytes: &[u8],
    encoding: &'static encoding_rs::Encoding,
    label: &str,
) -> Result<String, Error> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        return Err(Error::parse(format!("invalid {} sequence", label)));
    }
    Ok(text.into_owned())
}
