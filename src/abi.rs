//! Fixed-shape ABI encoding for the three read-only identity registry calls.
//!
//! This is deliberately not a general ABI library: it covers `(uint256)` and
//! `(uint256,string)` call data plus address and dynamic `bytes`/`string`
//! return values.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{MeshgateError, Result};

const WORD: usize = 32;

/// `ownerOf(uint256)`
pub const SELECTOR_OWNER_OF: &str = "6352211e";
/// `tokenURI(uint256)`
pub const SELECTOR_TOKEN_URI: &str = "c87b56dd";
/// `getMetadata(uint256,string)`
pub const SELECTOR_GET_METADATA: &str = "cb4799f2";

static ADDRESS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("regex"));
static SELECTOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9a-fA-F]{8}$").expect("regex"));

fn decode_err(message: impl Into<String>) -> MeshgateError {
    MeshgateError::Decode(message.into())
}

fn strip_0x(value: &str) -> &str {
    value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value)
}

/// Parses a decimal or `0x`-prefixed hex integer into a big-endian 32-byte word.
fn parse_uint256(value: &str) -> Result<[u8; WORD]> {
    let trimmed = value.trim();
    if trimmed.starts_with('-') {
        return Err(decode_err(format!("uint256 cannot be negative: {trimmed}")));
    }
    let trimmed = trimmed.strip_prefix('+').unwrap_or(trimmed);
    if trimmed.is_empty() {
        return Err(decode_err("uint256 value is empty"));
    }

    let mut word = [0u8; WORD];
    if trimmed.starts_with("0x") || trimmed.starts_with("0X") {
        let digits = strip_0x(trimmed).trim_start_matches('0');
        if digits.len() > WORD * 2 {
            return Err(decode_err(format!("uint256 exceeds 32 bytes: {trimmed}")));
        }
        let padded = format!("{digits:0>64}");
        hex::decode_to_slice(&padded, &mut word)
            .map_err(|e| decode_err(format!("invalid hex uint256 '{trimmed}': {e}")))?;
        return Ok(word);
    }

    for ch in trimmed.chars() {
        let digit = ch
            .to_digit(10)
            .ok_or_else(|| decode_err(format!("invalid decimal uint256: {trimmed}")))?;
        let mut carry = digit;
        for byte in word.iter_mut().rev() {
            let next = u32::from(*byte) * 10 + carry;
            *byte = (next & 0xff) as u8;
            carry = next >> 8;
        }
        if carry != 0 {
            return Err(decode_err(format!("uint256 exceeds 32 bytes: {trimmed}")));
        }
    }
    Ok(word)
}

/// Encodes an unsigned integer (decimal or `0x` hex text) as 64 hex characters.
pub fn encode_uint256(value: &str) -> Result<String> {
    Ok(hex::encode(parse_uint256(value)?))
}

fn encode_usize_word(value: usize) -> String {
    format!("{value:064x}")
}

fn normalize_selector(selector: &str) -> Result<String> {
    let raw = strip_0x(selector.trim());
    if !SELECTOR_RE.is_match(raw) {
        return Err(decode_err(format!(
            "selector must be exactly 4 bytes (8 hex characters), got '{selector}'"
        )));
    }
    Ok(raw.to_ascii_lowercase())
}

/// Call data for a `(uint256)` function.
pub fn encode_call_data_uint(selector: &str, value: &str) -> Result<String> {
    let selector = normalize_selector(selector)?;
    Ok(format!("0x{selector}{}", encode_uint256(value)?))
}

/// Call data for a `(uint256,string)` function: two head words then the string tail.
pub fn encode_call_data_uint_string(selector: &str, value: &str, text: &str) -> Result<String> {
    let selector = normalize_selector(selector)?;
    let mut out = format!("0x{selector}{}", encode_uint256(value)?);
    out.push_str(&encode_usize_word(2 * WORD));
    out.push_str(&encode_dynamic_tail(text.as_bytes()));
    Ok(out)
}

fn encode_dynamic_tail(bytes: &[u8]) -> String {
    let padded_len = bytes.len().div_ceil(WORD) * WORD;
    let mut payload = bytes.to_vec();
    payload.resize(padded_len, 0);
    format!("{}{}", encode_usize_word(bytes.len()), hex::encode(payload))
}

/// ABI return encoding of a single dynamic `bytes` value.
pub fn encode_bytes_return_data(bytes: &[u8]) -> String {
    format!("0x{}{}", encode_usize_word(WORD), encode_dynamic_tail(bytes))
}

/// ABI return encoding of a single `address` value.
pub fn encode_address_return_data(address: &str) -> Result<String> {
    let address = normalize_address(address)?;
    Ok(format!("0x{:0>64}", strip_0x(&address)))
}

fn return_bytes(data: &str) -> Result<Vec<u8>> {
    hex::decode(strip_0x(data.trim()))
        .map_err(|e| decode_err(format!("return data is not valid hex: {e}")))
}

fn word_at(data: &[u8], start: usize) -> Option<&[u8]> {
    data.get(start..start.checked_add(WORD)?)
}

fn word_to_usize(word: &[u8], what: &str) -> Result<usize> {
    let (high, low) = word.split_at(WORD - 8);
    if high.iter().any(|b| *b != 0) {
        return Err(decode_err(format!("invalid {what}: value does not fit in memory")));
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(low);
    usize::try_from(u64::from_be_bytes(buf))
        .map_err(|_| decode_err(format!("invalid {what}: value does not fit in memory")))
}

/// Low 20 bytes of the first return word, as a lowercase `0x` address.
pub fn decode_address_from_return_data(data: &str) -> Result<String> {
    let bytes = return_bytes(data)?;
    let word = word_at(&bytes, 0).ok_or_else(|| decode_err("return data too short"))?;
    Ok(format!("0x{}", hex::encode(&word[WORD - 20..])))
}

pub fn decode_dynamic_bytes_from_return_data(data: &str) -> Result<Vec<u8>> {
    let bytes = return_bytes(data)?;
    let offset_word = word_at(&bytes, 0).ok_or_else(|| decode_err("return data too short"))?;
    let offset = word_to_usize(offset_word, "offset")?;

    let length_word = word_at(&bytes, offset).ok_or_else(|| {
        decode_err(format!(
            "invalid offset: {offset} exceeds return data of {} bytes",
            bytes.len()
        ))
    })?;
    let length = word_to_usize(length_word, "length")?;

    let start = offset + WORD;
    start
        .checked_add(length)
        .and_then(|end| bytes.get(start..end))
        .map(<[u8]>::to_vec)
        .ok_or_else(|| {
            decode_err(format!(
                "invalid length: {length} bytes at offset {start} exceeds return data of {} bytes",
                bytes.len()
            ))
        })
}

pub fn decode_string_from_return_data(data: &str) -> Result<String> {
    let bytes = decode_dynamic_bytes_from_return_data(data)?;
    String::from_utf8(bytes).map_err(|e| decode_err(format!("string is not valid utf-8: {e}")))
}

/// Lowercase, `0x`-prefixed 20-byte address.
pub fn normalize_address(address: &str) -> Result<String> {
    let trimmed = address.trim();
    let candidate = if trimmed.starts_with("0x") || trimmed.starts_with("0X") {
        format!("0x{}", &trimmed[2..])
    } else {
        format!("0x{trimmed}")
    };
    if !ADDRESS_RE.is_match(&candidate) {
        return Err(MeshgateError::Config(format!(
            "invalid address '{address}': expected 40 hex characters"
        )));
    }
    Ok(candidate.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn uint256_is_left_padded_big_endian() {
        assert_eq!(encode_uint256("0").unwrap(), "0".repeat(64));
        assert_eq!(encode_uint256("1").unwrap(), format!("{}1", "0".repeat(63)));
        assert_eq!(encode_uint256("256").unwrap(), format!("{}100", "0".repeat(61)));
        assert_eq!(encode_uint256("0xff").unwrap(), format!("{}ff", "0".repeat(62)));
    }

    #[test]
    fn uint256_accepts_the_maximum_and_rejects_overflow() {
        let max = "115792089237316195423570985008687907853269984665640564039457584007913129639935";
        assert_eq!(encode_uint256(max).unwrap(), "f".repeat(64));
        let over = "115792089237316195423570985008687907853269984665640564039457584007913129639936";
        assert!(encode_uint256(over).is_err());
        assert!(encode_uint256(&format!("0x1{}", "0".repeat(64))).is_err());
    }

    #[test]
    fn uint256_rejects_negative_and_garbage() {
        assert!(matches!(encode_uint256("-1"), Err(MeshgateError::Decode(_))));
        assert!(encode_uint256("").is_err());
        assert!(encode_uint256("12a").is_err());
    }

    #[test]
    fn selector_must_be_four_bytes() {
        assert!(encode_call_data_uint("6352211", "1").is_err());
        assert!(encode_call_data_uint("6352211e00", "1").is_err());
        assert!(encode_call_data_uint("zzzzzzzz", "1").is_err());
        let data = encode_call_data_uint("0x6352211E", "7").unwrap();
        assert_eq!(data, format!("0x6352211e{}7", "0".repeat(63)));
    }

    #[test]
    fn uint_string_call_data_layout() {
        let data = encode_call_data_uint_string(SELECTOR_GET_METADATA, "1", "agentWallet").unwrap();
        let body = data.strip_prefix("0xcb4799f2").unwrap();
        let words: Vec<&str> = (0..body.len() / 64).map(|i| &body[i * 64..(i + 1) * 64]).collect();
        assert_eq!(words.len(), 4);
        assert_eq!(words[0], format!("{}1", "0".repeat(63)));
        assert_eq!(words[1], format!("{}40", "0".repeat(62)));
        assert_eq!(words[2], format!("{}b", "0".repeat(63)));
        assert!(words[3].starts_with(&hex::encode("agentWallet")));
        assert!(words[3].ends_with(&"0".repeat(42)));
    }

    #[test]
    fn address_is_taken_from_low_twenty_bytes() {
        let data = format!("0x{}{}", "ff".repeat(12), "ab".repeat(20));
        assert_eq!(
            decode_address_from_return_data(&data).unwrap(),
            format!("0x{}", "ab".repeat(20))
        );
        assert!(decode_address_from_return_data("0x1234").is_err());
    }

    #[test]
    fn dynamic_bytes_rejects_truncation_at_every_stage() {
        let err = decode_dynamic_bytes_from_return_data("0x").unwrap_err();
        assert!(err.to_string().contains("return data too short"));

        let offset_only = format!("0x{}", encode_usize_word(32));
        let err = decode_dynamic_bytes_from_return_data(&offset_only).unwrap_err();
        assert!(err.to_string().contains("invalid offset"));

        let truncated_payload = format!("0x{}{}", encode_usize_word(32), encode_usize_word(5));
        let err = decode_dynamic_bytes_from_return_data(&truncated_payload).unwrap_err();
        assert!(err.to_string().contains("invalid length"));

        let huge_offset = format!("0x{}", "ff".repeat(32));
        assert!(decode_dynamic_bytes_from_return_data(&huge_offset).is_err());
    }

    #[test]
    fn string_decoding_reads_a_token_uri() {
        let encoded = encode_bytes_return_data(b"ipfs://agent.json");
        assert_eq!(decode_string_from_return_data(&encoded).unwrap(), "ipfs://agent.json");
        let empty = encode_bytes_return_data(b"");
        assert_eq!(decode_string_from_return_data(&empty).unwrap(), "");
    }

    #[test]
    fn address_normalization() {
        let upper = format!("0x{}", "AB".repeat(20));
        assert_eq!(normalize_address(&upper).unwrap(), format!("0x{}", "ab".repeat(20)));
        assert_eq!(
            normalize_address(&"cd".repeat(20)).unwrap(),
            format!("0x{}", "cd".repeat(20))
        );
        assert!(matches!(normalize_address("0x1234"), Err(MeshgateError::Config(_))));
        assert!(normalize_address(&format!("0x{}", "zz".repeat(20))).is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            failure_persistence: None,
            .. ProptestConfig::default()
        })]
        #[test]
        fn dynamic_bytes_round_trip(bytes in proptest::collection::vec(any::<u8>(), 0..200)) {
            let encoded = encode_bytes_return_data(&bytes);
            prop_assert_eq!(decode_dynamic_bytes_from_return_data(&encoded).unwrap(), bytes);
        }

        #[test]
        fn uint256_matches_u128_hex(value in any::<u128>()) {
            prop_assert_eq!(encode_uint256(&value.to_string()).unwrap(), format!("{value:064x}"));
        }
    }
}
