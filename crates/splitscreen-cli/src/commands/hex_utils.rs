//! Hex address parsing shared by commands.

use anyhow::Result;

/// Parse a hex address with or without a `0x` prefix.
pub fn parse_hex_address(s: &str) -> Result<u64> {
    let digits = s.trim().trim_start_matches("0x").trim_start_matches("0X");
    u64::from_str_radix(digits, 16).map_err(|e| anyhow::anyhow!("Invalid hex address {:?}: {}", s, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_address_with_prefix() {
        assert_eq!(parse_hex_address("0x140000000").unwrap(), 0x1_4000_0000);
        assert_eq!(parse_hex_address("0X1000").unwrap(), 0x1000);
    }

    #[test]
    fn test_parse_hex_address_without_prefix() {
        assert_eq!(parse_hex_address("DEADBEEF").unwrap(), 0xDEAD_BEEF);
        assert_eq!(parse_hex_address(" 7ff6 ").unwrap(), 0x7FF6);
    }

    #[test]
    fn test_parse_hex_address_invalid() {
        assert!(parse_hex_address("0xZZZ").is_err());
        assert!(parse_hex_address("").is_err());
    }
}
