//! Line-oriented tokenizer for trace files: `<op_code> <hex_address>` per
//! line, blank lines skipped. Codes 8 and 9 may omit the address.

use llc_core::CacheOp;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TraceLineError {
    #[error("invalid operation code '{0}'")]
    InvalidOpCode(String),
    #[error("unknown operation code {0}")]
    UnknownOpCode(u8),
    #[error("operation code {0} requires an address")]
    MissingAddress(u8),
    #[error("invalid hex address '{0}'")]
    InvalidAddress(String),
    #[error("unexpected trailing token '{0}'")]
    TrailingToken(String),
}

/// Parse one trace line. Returns `Ok(None)` for blank lines.
pub fn parse_trace_line(line: &str) -> Result<Option<CacheOp>, TraceLineError> {
    let mut tokens = line.split_whitespace();
    let Some(code_token) = tokens.next() else {
        return Ok(None);
    };

    let code: u8 = code_token
        .parse()
        .map_err(|_| TraceLineError::InvalidOpCode(code_token.into()))?;
    let address = tokens.next().map(parse_hex_address).transpose()?;
    if let Some(extra) = tokens.next() {
        return Err(TraceLineError::TrailingToken(extra.into()));
    }

    let op = match (code, address) {
        (0, Some(address)) => CacheOp::DataRead(address),
        (1, Some(address)) => CacheOp::DataWrite(address),
        (2, Some(address)) => CacheOp::InstRead(address),
        (3, Some(address)) => CacheOp::SnoopRead(address),
        (4, Some(address)) => CacheOp::SnoopWrite(address),
        (5, Some(address)) => CacheOp::SnoopRwim(address),
        (6, Some(address)) => CacheOp::SnoopInvalidate(address),
        (0..=6, None) => return Err(TraceLineError::MissingAddress(code)),
        // The address is tolerated but meaningless for codes 8 and 9.
        (8, _) => CacheOp::ClearCache,
        (9, _) => CacheOp::PrintState,
        (code, _) => return Err(TraceLineError::UnknownOpCode(code)),
    };

    Ok(Some(op))
}

fn parse_hex_address(token: &str) -> Result<u32, TraceLineError> {
    let digits = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .unwrap_or(token);
    u32::from_str_radix(digits, 16).map_err(|_| TraceLineError::InvalidAddress(token.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_each_operation_code() {
        assert_eq!(parse_trace_line("0 10021F30").unwrap(), Some(CacheOp::DataRead(0x10021F30)));
        assert_eq!(parse_trace_line("1 A0").unwrap(), Some(CacheOp::DataWrite(0xA0)));
        assert_eq!(parse_trace_line("2 40").unwrap(), Some(CacheOp::InstRead(0x40)));
        assert_eq!(parse_trace_line("3 40").unwrap(), Some(CacheOp::SnoopRead(0x40)));
        assert_eq!(parse_trace_line("4 40").unwrap(), Some(CacheOp::SnoopWrite(0x40)));
        assert_eq!(parse_trace_line("5 40").unwrap(), Some(CacheOp::SnoopRwim(0x40)));
        assert_eq!(parse_trace_line("6 40").unwrap(), Some(CacheOp::SnoopInvalidate(0x40)));
        assert_eq!(parse_trace_line("8").unwrap(), Some(CacheOp::ClearCache));
        assert_eq!(parse_trace_line("9").unwrap(), Some(CacheOp::PrintState));
    }

    #[test]
    fn accepts_0x_prefixed_addresses() {
        assert_eq!(parse_trace_line("1 0xABC").unwrap(), Some(CacheOp::DataWrite(0xABC)));
        assert_eq!(parse_trace_line("1 0XABC").unwrap(), Some(CacheOp::DataWrite(0xABC)));
    }

    #[test]
    fn skips_blank_lines() {
        assert_eq!(parse_trace_line("").unwrap(), None);
        assert_eq!(parse_trace_line("   \t  ").unwrap(), None);
    }

    #[test]
    fn tolerates_an_address_on_codes_8_and_9() {
        assert_eq!(parse_trace_line("8 0").unwrap(), Some(CacheOp::ClearCache));
        assert_eq!(parse_trace_line("9 DEAD").unwrap(), Some(CacheOp::PrintState));
    }

    #[test]
    fn rejects_code_7_and_out_of_range_codes() {
        assert!(matches!(parse_trace_line("7 40"), Err(TraceLineError::UnknownOpCode(7))));
        assert!(matches!(parse_trace_line("12 40"), Err(TraceLineError::UnknownOpCode(12))));
    }

    #[test]
    fn rejects_missing_address_for_memory_operations() {
        assert!(matches!(parse_trace_line("0"), Err(TraceLineError::MissingAddress(0))));
        assert!(matches!(parse_trace_line("6"), Err(TraceLineError::MissingAddress(6))));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(parse_trace_line("x 40"), Err(TraceLineError::InvalidOpCode(_))));
        assert!(matches!(parse_trace_line("0 wxyz"), Err(TraceLineError::InvalidAddress(_))));
        assert!(matches!(parse_trace_line("0 40 extra"), Err(TraceLineError::TrailingToken(_))));
        assert!(matches!(parse_trace_line("-1 40"), Err(TraceLineError::InvalidOpCode(_))));
    }
}
