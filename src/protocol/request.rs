//! Wire grammar for register operation requests.
//!
//! Payloads are whitespace-delimited with fixed token positions:
//!
//! ```text
//! <unused> <COOKIE> <unused> <ADDRESS> <PORT> <TIMEOUT> <SLAVE_ID> <MODBUS_FUNCTION>
//!     <REGISTER_NUMBER> [<REGISTER_COUNT>] [<DATA>]
//! ```
//!
//! `REGISTER_NUMBER` is one-based on the wire and stored as a zero-based
//! offset. `REGISTER_COUNT` is required for functions 1-4 and 15/16; `DATA`
//! is a comma-separated list of u16 values required for 15/16.

use std::time::Duration;

use crate::utils::error::GatewayError;

pub const OP_READ_COILS: u8 = 1;
pub const OP_READ_DISCRETE_INPUTS: u8 = 2;
pub const OP_READ_HOLDING_REGISTERS: u8 = 3;
pub const OP_READ_INPUT_REGISTERS: u8 = 4;
pub const OP_WRITE_SINGLE_COIL: u8 = 5;
pub const OP_WRITE_SINGLE_REGISTER: u8 = 6;
pub const OP_WRITE_MULTIPLE_COILS: u8 = 15;
pub const OP_WRITE_MULTIPLE_REGISTERS: u8 = 16;

/// Minimum token count for any request: everything up to REGISTER_NUMBER.
const MIN_TOKENS: usize = 9;

/// A fully validated register operation parsed from one inbound payload.
///
/// Instances are either complete and range-checked or never constructed;
/// no partially populated request reaches a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationRequest {
    pub cookie: u64,
    pub target_address: String,
    pub target_port: u16,
    pub timeout: Duration,
    pub unit_id: u8,
    pub operation_code: u8,
    pub register_offset: u16,
    pub register_count: u16,
    /// Write payload for functions 15/16. For functions 5/6 the grammar
    /// leaves this empty; programmatic callers populate index 0 with the
    /// value to write.
    pub values: Vec<u16>,
}

/// A grammar rejection carrying the best-known correlation cookie.
///
/// Failures before the cookie token parses report cookie 0; later failures
/// echo the cookie so the requester can correlate the error response.
#[derive(Debug)]
pub struct ParseFailure {
    pub cookie: u64,
    pub error: GatewayError,
}

pub fn parse_request(payload: &str) -> Result<OperationRequest, ParseFailure> {
    let tokens: Vec<&str> = payload.split_whitespace().collect();
    if tokens.len() < MIN_TOKENS {
        return Err(ParseFailure {
            cookie: 0,
            error: GatewayError::IncompleteRequest,
        });
    }

    let cookie = tokens[1].parse::<u64>().map_err(|_| ParseFailure {
        cookie: 0,
        error: GatewayError::InvalidField("COOKIE"),
    })?;
    let fail = |error| ParseFailure { cookie, error };

    let target_address = tokens[3].to_string();

    let target_port = tokens[4]
        .parse::<u16>()
        .ok()
        .filter(|port| *port >= 1)
        .ok_or_else(|| fail(GatewayError::InvalidField("PORT")))?;

    let timeout_s = tokens[5]
        .parse::<u64>()
        .ok()
        .filter(|secs| (1..=999).contains(secs))
        .ok_or_else(|| fail(GatewayError::InvalidField("TIMEOUT")))?;

    let unit_id = tokens[6]
        .parse::<u8>()
        .ok()
        .filter(|id| *id >= 1)
        .ok_or_else(|| fail(GatewayError::InvalidField("SLAVE_ID")))?;

    let operation_code = tokens[7]
        .parse::<u8>()
        .map_err(|_| fail(GatewayError::InvalidField("MODBUS_FUNCTION")))?;

    // One-based on the wire; zero is rejected rather than wrapped.
    let register_number = tokens[8]
        .parse::<u16>()
        .ok()
        .filter(|n| *n >= 1)
        .ok_or_else(|| fail(GatewayError::InvalidField("REGISTER_NUMBER")))?;
    let register_offset = register_number - 1;

    let mut register_count = 0u16;
    let mut values = Vec::new();

    match operation_code {
        OP_READ_COILS | OP_READ_DISCRETE_INPUTS | OP_READ_HOLDING_REGISTERS
        | OP_READ_INPUT_REGISTERS => {
            let count_token = tokens
                .get(9)
                .ok_or_else(|| fail(GatewayError::IncompleteRequest))?;
            register_count = count_token
                .parse::<u16>()
                .map_err(|_| fail(GatewayError::InvalidField("REGISTER_COUNT")))?;
        }
        OP_WRITE_MULTIPLE_COILS | OP_WRITE_MULTIPLE_REGISTERS => {
            if tokens.len() < 11 {
                return Err(fail(GatewayError::IncompleteRequest));
            }
            register_count = tokens[9]
                .parse::<u16>()
                .map_err(|_| fail(GatewayError::InvalidField("REGISTER_COUNT")))?;
            for raw in tokens[10].split(',') {
                let value = raw
                    .parse::<u16>()
                    .map_err(|_| fail(GatewayError::InvalidField("DATA")))?;
                values.push(value);
            }
            if values.len() != register_count as usize {
                return Err(fail(GatewayError::CountMismatch));
            }
        }
        // Functions 5/6 carry no further grammar tokens; any other code is
        // accepted here and rejected by the backend.
        _ => {}
    }

    Ok(OperationRequest {
        cookie,
        target_address,
        target_port,
        timeout: Duration::from_secs(timeout_s),
        unit_id,
        operation_code,
        register_offset,
        register_count,
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_err(payload: &str) -> ParseFailure {
        parse_request(payload).expect_err("expected parse failure")
    }

    #[test]
    fn test_read_holding_registers_request() {
        let request = parse_request("CMD 42 ACT 10.0.0.5 502 5 1 3 100 4").unwrap();
        assert_eq!(request.cookie, 42);
        assert_eq!(request.target_address, "10.0.0.5");
        assert_eq!(request.target_port, 502);
        assert_eq!(request.timeout, Duration::from_secs(5));
        assert_eq!(request.unit_id, 1);
        assert_eq!(request.operation_code, OP_READ_HOLDING_REGISTERS);
        assert_eq!(request.register_offset, 99);
        assert_eq!(request.register_count, 4);
        assert!(request.values.is_empty());
    }

    #[test]
    fn test_write_multiple_registers_request() {
        let request = parse_request("CMD 7 ACT host 502 5 1 16 10 2 5,9").unwrap();
        assert_eq!(request.cookie, 7);
        assert_eq!(request.register_offset, 9);
        assert_eq!(request.register_count, 2);
        assert_eq!(request.values, vec![5, 9]);
    }

    #[test]
    fn test_single_write_parses_no_value_tokens() {
        let request = parse_request("CMD 3 ACT host 502 5 1 6 20 77").unwrap();
        assert_eq!(request.operation_code, OP_WRITE_SINGLE_REGISTER);
        assert_eq!(request.register_count, 0);
        assert!(request.values.is_empty());
    }

    #[test]
    fn test_too_few_tokens_reports_cookie_zero() {
        let failure = parse_err("CMD 42 ACT host 502");
        assert_eq!(failure.cookie, 0);
        assert!(matches!(failure.error, GatewayError::IncompleteRequest));
    }

    #[test]
    fn test_invalid_cookie_reports_cookie_zero() {
        let failure = parse_err("CMD abc ACT host 502 5 1 3 1 1");
        assert_eq!(failure.cookie, 0);
        assert!(matches!(failure.error, GatewayError::InvalidField("COOKIE")));
    }

    #[test]
    fn test_failures_after_cookie_echo_it() {
        let failure = parse_err("CMD 42 ACT host 0 5 1 3 1 1");
        assert_eq!(failure.cookie, 42);
        assert!(matches!(failure.error, GatewayError::InvalidField("PORT")));
    }

    #[test]
    fn test_port_bounds() {
        assert!(parse_request("CMD 1 ACT host 1 5 1 3 1 1").is_ok());
        assert!(parse_request("CMD 1 ACT host 65535 5 1 3 1 1").is_ok());
        assert!(matches!(
            parse_err("CMD 1 ACT host 0 5 1 3 1 1").error,
            GatewayError::InvalidField("PORT")
        ));
        assert!(matches!(
            parse_err("CMD 1 ACT host 65536 5 1 3 1 1").error,
            GatewayError::InvalidField("PORT")
        ));
    }

    #[test]
    fn test_timeout_bounds() {
        assert!(parse_request("CMD 1 ACT host 502 1 1 3 1 1").is_ok());
        assert!(parse_request("CMD 1 ACT host 502 999 1 3 1 1").is_ok());
        assert!(matches!(
            parse_err("CMD 1 ACT host 502 0 1 3 1 1").error,
            GatewayError::InvalidField("TIMEOUT")
        ));
        assert!(matches!(
            parse_err("CMD 1 ACT host 502 1000 1 3 1 1").error,
            GatewayError::InvalidField("TIMEOUT")
        ));
    }

    #[test]
    fn test_unit_id_bounds() {
        assert!(parse_request("CMD 1 ACT host 502 5 1 3 1 1").is_ok());
        assert!(parse_request("CMD 1 ACT host 502 5 255 3 1 1").is_ok());
        assert!(matches!(
            parse_err("CMD 1 ACT host 502 5 0 3 1 1").error,
            GatewayError::InvalidField("SLAVE_ID")
        ));
        assert!(matches!(
            parse_err("CMD 1 ACT host 502 5 256 3 1 1").error,
            GatewayError::InvalidField("SLAVE_ID")
        ));
    }

    #[test]
    fn test_register_number_is_converted_to_offset() {
        let request = parse_request("CMD 1 ACT host 502 5 1 3 1 1").unwrap();
        assert_eq!(request.register_offset, 0);
        let request = parse_request("CMD 1 ACT host 502 5 1 3 1000 1").unwrap();
        assert_eq!(request.register_offset, 999);
    }

    #[test]
    fn test_register_number_zero_is_rejected() {
        let failure = parse_err("CMD 1 ACT host 502 5 1 3 0 1");
        assert_eq!(failure.cookie, 1);
        assert!(matches!(
            failure.error,
            GatewayError::InvalidField("REGISTER_NUMBER")
        ));
    }

    #[test]
    fn test_read_without_count_is_incomplete() {
        let failure = parse_err("CMD 1 ACT host 502 5 1 3 1");
        assert!(matches!(failure.error, GatewayError::IncompleteRequest));
    }

    #[test]
    fn test_count_mismatch_for_multiple_write() {
        let failure = parse_err("CMD 3 ACT host 502 5 1 16 1 2 5");
        assert_eq!(failure.cookie, 3);
        assert!(matches!(failure.error, GatewayError::CountMismatch));
    }

    #[test]
    fn test_bad_data_value() {
        let failure = parse_err("CMD 3 ACT host 502 5 1 16 1 2 5,x");
        assert!(matches!(failure.error, GatewayError::InvalidField("DATA")));
    }

    #[test]
    fn test_unknown_operation_code_is_accepted_by_grammar() {
        let request = parse_request("CMD 1 ACT host 502 5 1 99 1").unwrap();
        assert_eq!(request.operation_code, 99);
        assert_eq!(request.register_count, 0);
    }
}
