//! Response text assembly.
//!
//! Every handled request yields exactly one line of response text:
//! `<cookie> OK [values...]` on success, `<cookie> ERROR: <reason>` on any
//! failure. The cookie always echoes the request (0 when it never parsed).

use crate::utils::error::GatewayError;

pub fn success(cookie: u64, results: &[u16]) -> String {
    if results.is_empty() {
        format!("{} OK", cookie)
    } else {
        let values = results
            .iter()
            .map(u16::to_string)
            .collect::<Vec<_>>()
            .join(" ");
        format!("{} OK {}", cookie, values)
    }
}

pub fn failure(cookie: u64, error: &GatewayError) -> String {
    format!("{} ERROR: {}", cookie, error)
}
