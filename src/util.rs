use crate::error::{LabError, LabResult};

/// Parses hex bytes such as `01 03 00 0A`, `01,03` or `0x01 0x03`.
/// Without separators the text is read two digits at a time.
pub fn parse_hex_bytes(text: &str) -> LabResult<Vec<u8>> {
    let tokens: Vec<&str> = text
        .split(|c: char| c.is_whitespace() || c == ',' || c == ':')
        .filter(|t| !t.is_empty())
        .collect();
    let tokens: Vec<String> = if tokens.len() == 1 {
        let digits = strip_prefix(tokens[0]);
        if digits.len() % 2 != 0 {
            return Err(LabError::Validation(format!(
                "Odd number of hex digits in {:?}",
                text
            )));
        }
        digits
            .as_bytes()
            .chunks(2)
            .map(|pair| String::from_utf8_lossy(pair).into_owned())
            .collect()
    } else {
        tokens.into_iter().map(|t| strip_prefix(t).to_string()).collect()
    };
    tokens
        .iter()
        .map(|t| {
            u8::from_str_radix(t, 16)
                .map_err(|e| LabError::Validation(format!("Invalid hex byte {:?}: {}", t, e)))
        })
        .collect()
}

fn strip_prefix(token: &str) -> &str {
    token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .unwrap_or(token)
}

pub fn format_hex_bytes(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
