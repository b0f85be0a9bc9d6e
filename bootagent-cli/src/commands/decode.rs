//! Offline decoding of captured request frames.

use anyhow::{Context, Result, bail};
use bootagent::{Codec, ProtocolConfig, Request, RequestFrame};
use console::style;

/// Decode command implementation.
pub(crate) fn cmd_decode(hex: &str, protocol: ProtocolConfig, json: bool) -> Result<()> {
    let bytes = parse_hex(hex)?;
    let frame = Codec::new(protocol)
        .decode(&bytes)
        .context("Failed to decode frame")?;

    if json {
        let output = serde_json::json!({
            "ok": true,
            "data": frame_json(&frame),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let kind = frame
        .request
        .kind()
        .map_or_else(|| "Unknown".to_string(), |k| format!("{k:?}"));
    eprintln!(
        "{} {} ({} bytes)",
        style("Frame:").bold(),
        style(kind).cyan(),
        bytes.len()
    );
    eprintln!("  id:       {:#04x}", frame.id);
    eprintln!("  command:  {:#04x}", frame.command);
    eprintln!("  selector: {:#06x}", frame.selector);
    match &frame.request {
        Request::WriteInfo { address, size } => {
            eprintln!("  address:  {address:#010x}");
            eprintln!("  size:     {size}");
        },
        Request::Run { address } => {
            eprintln!("  address:  {address:#08x}");
        },
        Request::WriteBin { block } => {
            eprintln!("  data:     {}", to_hex(block));
        },
        _ => {},
    }
    eprintln!("  checksum: {:#06x}", frame.checksum);
    Ok(())
}

/// Parse hex text, ignoring whitespace, colons and a leading `0x`.
fn parse_hex(text: &str) -> Result<Vec<u8>> {
    let trimmed = text.trim();
    let trimmed = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let digits: Vec<u8> = trimmed
        .bytes()
        .filter(|b| !b.is_ascii_whitespace() && *b != b':')
        .collect();

    if digits.is_empty() {
        bail!("No frame bytes given");
    }
    if digits.len() % 2 != 0 {
        bail!("Odd number of hex digits ({})", digits.len());
    }

    digits
        .chunks(2)
        .map(|pair| {
            let pair = std::str::from_utf8(pair).context("Invalid hex digit")?;
            u8::from_str_radix(pair, 16).with_context(|| format!("Invalid hex byte '{pair}'"))
        })
        .collect()
}

fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

fn frame_json(frame: &RequestFrame) -> serde_json::Value {
    let fields = match &frame.request {
        Request::WriteInfo { address, size } => serde_json::json!({
            "address": address,
            "size": size,
        }),
        Request::Run { address } => serde_json::json!({ "address": address }),
        Request::WriteBin { block } => serde_json::json!({ "data": to_hex(block) }),
        _ => serde_json::json!({}),
    };

    serde_json::json!({
        "id": frame.id,
        "command": frame.command,
        "selector": format!("{:#06x}", frame.selector),
        "kind": frame.request.kind(),
        "checksum": format!("{:#06x}", frame.checksum),
        "fields": fields,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bootagent::{ChecksumMode, SelectorOrder};

    #[test]
    fn test_parse_hex_accepts_separators() {
        assert_eq!(
            parse_hex("0x01 00:01 60").unwrap(),
            vec![0x01, 0x00, 0x01, 0x60]
        );
        assert_eq!(parse_hex("  aBcD ").unwrap(), vec![0xAB, 0xCD]);
    }

    #[test]
    fn test_parse_hex_rejects_bad_input() {
        assert!(parse_hex("").is_err());
        assert!(parse_hex("123").is_err());
        assert!(parse_hex("zz").is_err());
    }

    #[test]
    fn test_frame_json_write_info() {
        let codec = Codec::new(ProtocolConfig::default());
        let bytes = codec
            .encode_typed(
                0x01,
                &Request::WriteInfo {
                    address: 0x2800,
                    size: 1000,
                },
            )
            .unwrap();
        let frame = codec
            .decode(&bytes)
            .unwrap();

        let value = frame_json(&frame);
        assert_eq!(value["kind"], "WriteInfo");
        assert_eq!(value["selector"], "0x6003");
        assert_eq!(value["command"], 0x10);
        assert_eq!(value["fields"]["address"], 0x2800);
        assert_eq!(value["fields"]["size"], 1000);
    }

    #[test]
    fn test_frame_json_unknown_selector() {
        let frame = Codec::default()
            .decode(&[0x01, 0x00, 0x34, 0x12, 0x11, 0x22])
            .unwrap();
        let value = frame_json(&frame);
        assert!(value["kind"].is_null());
        assert_eq!(value["selector"], "0x1234");
    }

    #[test]
    fn test_decode_honours_protocol_variant() {
        let protocol = ProtocolConfig {
            checksum: ChecksumMode::Crc16,
            selector_order: SelectorOrder::HighFirst,
            ..ProtocolConfig::default()
        };
        let bytes = Codec::new(protocol)
            .encode_typed(0x02, &Request::Run { address: 0x2800 })
            .unwrap();
        let hex = to_hex(&bytes);

        assert!(cmd_decode(&hex, protocol, true).is_ok());
        assert!(cmd_decode(&hex, ProtocolConfig::default(), true).is_err());
    }
}
