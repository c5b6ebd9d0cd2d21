// src/harness/checksum.rs: EIP-55 address checksumming for candidate source
//
// solc rejects mixed-case address literals with a wrong checksum, so every
// 20-byte hex literal in candidate code is rewritten to its canonical form.

use alloy::primitives::Address;

use crate::infra::errors::VeriteError;

/// Placeholder candidates may use instead of the literal target address.
pub const TARGET_PLACEHOLDER: &str = "0xTARGET_CONTRACT_ADDRESS";

const HEX_LEN: usize = 40;

pub fn is_address(s: &str) -> bool {
    s.len() == HEX_LEN + 2
        && s.starts_with("0x")
        && s.as_bytes()[2..].iter().all(u8::is_ascii_hexdigit)
}

/// EIP-55 mixed-case form of `address`. Input case is ignored.
pub fn to_checksum(address: &str) -> Result<String, VeriteError> {
    let trimmed = address.trim();
    let hex_part = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if hex_part.len() != HEX_LEN {
        return Err(VeriteError::InvalidAddress(address.to_string()));
    }
    let parsed: Address = hex_part
        .to_ascii_lowercase()
        .parse()
        .map_err(|_| VeriteError::InvalidAddress(address.to_string()))?;
    Ok(parsed.to_checksum(None))
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Rewrite every standalone 40-hex-digit literal in `code` to checksummed
/// form and substitute the target placeholder.
pub fn checksum_literals(code: &str, target: &str) -> Result<String, VeriteError> {
    let target = to_checksum(target)?;
    let code = code.replace(TARGET_PLACEHOLDER, &target);
    let bytes = code.as_bytes();

    let mut out = String::with_capacity(code.len());
    let mut last = 0;
    let mut i = 0;
    while i + HEX_LEN + 2 <= bytes.len() {
        let starts_literal = bytes[i] == b'0'
            && (bytes[i + 1] == b'x' || bytes[i + 1] == b'X')
            && (i == 0 || !is_ident_byte(bytes[i - 1]));
        if starts_literal {
            let end = i + 2 + HEX_LEN;
            let body = &bytes[i + 2..end];
            let bounded = end == bytes.len() || !is_ident_byte(bytes[end]);
            if bounded && body.iter().all(u8::is_ascii_hexdigit) {
                out.push_str(&code[last..i]);
                out.push_str(&to_checksum(&code[i..end])?);
                last = end;
                i = end;
                continue;
            }
        }
        i += 1;
    }
    out.push_str(&code[last..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_checksums() {
        assert_eq!(
            to_checksum("0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed").unwrap(),
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"
        );
        assert_eq!(
            to_checksum("0xFB6916095CA1DF60BB79CE92CE3EA74C37C5D359").unwrap(),
            "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359"
        );
        assert_eq!(
            to_checksum("c02aaa39b223fe8d0a0e5c4f27ead9083c756cc2").unwrap(),
            "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"
        );
    }

    #[test]
    fn test_output_passes_strict_parse() {
        let once = to_checksum("0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48").unwrap();
        assert!(Address::parse_checksummed(&once, None).is_ok());
        assert!(Address::parse_checksummed("0xa0B86991c6218b36c1d19D4a2e9Eb0cE3606eB48", None).is_err());
    }

    #[test]
    fn test_idempotent() {
        let once = to_checksum("0xdbf03b407c01e7cd3cbea99509d93f8dddc8c6fb").unwrap();
        assert_eq!(to_checksum(&once).unwrap(), once);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(matches!(
            to_checksum("0x1234"),
            Err(VeriteError::InvalidAddress(_))
        ));
        assert!(to_checksum("0xzz5aeb6053f3e94c9b9a09f33669435e7ef1beaed").is_err());
    }

    #[test]
    fn test_rewrites_literals_and_placeholder() {
        let code = r#"
address constant WETH = 0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2;
IVault v = IVault(0xTARGET_CONTRACT_ADDRESS);
bytes32 h = 0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed5aaeb6053f3e94c9b9a09f33;
uint x = 0x10;
"#;
        let out = checksum_literals(code, "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed").unwrap();
        assert!(out.contains("= 0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2;"));
        assert!(out.contains("IVault(0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed)"));
        // 32-byte constants are not addresses
        assert!(out.contains("0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed5aaeb6053f3e94c9b9a09f33"));
        assert!(out.contains("uint x = 0x10;"));
        assert_eq!(
            checksum_literals(&out, "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed").unwrap(),
            out
        );
    }

    #[test]
    fn test_invalid_target() {
        assert!(checksum_literals("contract A {}", "not-an-address").is_err());
    }
}
