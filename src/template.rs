use std::fmt;

use crate::error::{LabError, LabResult};
use crate::value::Value;

/// A channel's placeholder name and id, as seen by a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub placeholder: String,
    pub id: String,
}

impl Scope {
    pub fn new(placeholder: impl Into<String>, id: impl fmt::Display) -> Self {
        Scope {
            placeholder: placeholder.into(),
            id: id.to_string(),
        }
    }
}

/// Fills the `{placeholder}` fields of one scope, unescaping doubled braces.
pub fn insert_id(command: &str, scope: &Scope) -> LabResult<String> {
    let mut out = String::with_capacity(command.len() + scope.id.len());
    let mut chars = command.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => name.push(ch),
                        None => return Err(LabError::template(command, "unclosed '{'")),
                    }
                }
                if name != scope.placeholder {
                    return Err(LabError::template(
                        command,
                        format!(
                            "placeholder {{{}}} cannot be filled by scope '{}'",
                            name, scope.placeholder
                        ),
                    ));
                }
                out.push_str(&scope.id);
            }
            '}' => return Err(LabError::template(command, "single '}' encountered")),
            other => out.push(other),
        }
    }
    Ok(out)
}

/// Fills every scope in turn, innermost first.
pub fn resolve(command: &str, scopes: &[Scope]) -> LabResult<String> {
    scopes
        .iter()
        .try_fold(command.to_owned(), |cmd, scope| insert_id(&cmd, scope))
}

/// Checks that `command` resolves with the given placeholder chain.
pub(crate) fn check_placeholders(command: &str, placeholders: &[String]) -> LabResult<()> {
    let dummy: Vec<Scope> = placeholders
        .iter()
        .enumerate()
        .map(|(i, p)| Scope::new(p.clone(), i))
        .collect();
    let resolved = resolve(command, &dummy)?;
    if resolved.contains('{') || resolved.contains('}') {
        return Err(LabError::template(
            command,
            "braces left over after filling every channel scope",
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Conversion {
    left: bool,
    plus: bool,
    space: bool,
    zero: bool,
    alternate: bool,
    width: Option<usize>,
    precision: Option<usize>,
    kind: char,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Literal(String),
    Convert(Conversion),
}

fn parse_conversions(template: &str) -> LabResult<Vec<Piece>> {
    let mut pieces = Vec::new();
    let mut literal = String::new();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            literal.push(c);
            continue;
        }
        if chars.peek() == Some(&'%') {
            chars.next();
            literal.push('%');
            continue;
        }

        let mut conv = Conversion::default();
        while let Some(&flag) = chars.peek() {
            match flag {
                '-' => conv.left = true,
                '+' => conv.plus = true,
                ' ' => conv.space = true,
                '0' => conv.zero = true,
                '#' => conv.alternate = true,
                _ => break,
            }
            chars.next();
        }
        let mut width = String::new();
        while let Some(&d) = chars.peek().filter(|d| d.is_ascii_digit()) {
            width.push(d);
            chars.next();
        }
        if !width.is_empty() {
            conv.width = width.parse().ok();
        }
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut precision = String::new();
            while let Some(&d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                precision.push(d);
                chars.next();
            }
            conv.precision = Some(precision.parse().unwrap_or(0));
        }
        match chars.next() {
            Some(kind @ ('d' | 'i' | 'u' | 'f' | 'F' | 'e' | 'E' | 'g' | 'G' | 's' | 'x' | 'X' | 'o')) => {
                conv.kind = kind;
            }
            Some(other) => {
                return Err(LabError::template(
                    template,
                    format!("unsupported conversion '%{}'", other),
                ));
            }
            None => return Err(LabError::template(template, "incomplete '%' conversion")),
        }

        if !literal.is_empty() {
            pieces.push(Piece::Literal(std::mem::take(&mut literal)));
        }
        pieces.push(Piece::Convert(conv));
    }
    if !literal.is_empty() {
        pieces.push(Piece::Literal(literal));
    }
    Ok(pieces)
}

/// Number of value slots in a set command.
pub(crate) fn count_value_slots(template: &str) -> LabResult<usize> {
    Ok(parse_conversions(template)?
        .iter()
        .filter(|p| matches!(p, Piece::Convert(_)))
        .count())
}

/// Formats `value` into the `%` conversions of `template`. A list value fills
/// one conversion per element.
pub fn format_value(template: &str, value: &Value) -> LabResult<String> {
    let pieces = parse_conversions(template)?;
    let args: Vec<&Value> = match value {
        Value::List(items) => items.iter().collect(),
        scalar => vec![scalar],
    };
    let slots = pieces
        .iter()
        .filter(|p| matches!(p, Piece::Convert(_)))
        .count();
    if slots != args.len() {
        return Err(LabError::template(
            template,
            format!("{} placeholder(s) for {} value(s)", slots, args.len()),
        ));
    }

    let mut out = String::new();
    let mut args = args.into_iter();
    for piece in pieces {
        match piece {
            Piece::Literal(text) => out.push_str(&text),
            Piece::Convert(conv) => {
                let Some(arg) = args.next() else {
                    return Err(LabError::template(template, "not enough values"));
                };
                out.push_str(&convert(template, &conv, arg)?);
            }
        }
    }
    Ok(out)
}

fn number(template: &str, conv: &Conversion, value: &Value) -> LabResult<f64> {
    match value {
        Value::Str(s) => s.trim().parse::<f64>().map_err(|_| {
            LabError::template(
                template,
                format!("%{} needs a number, got {:?}", conv.kind, s),
            )
        }),
        other => other.as_f64().ok_or_else(|| {
            LabError::template(template, format!("%{} needs a number, got {}", conv.kind, other))
        }),
    }
}

fn convert(template: &str, conv: &Conversion, value: &Value) -> LabResult<String> {
    let body = match conv.kind {
        's' => {
            let text = value.to_string();
            match conv.precision {
                Some(p) => text.chars().take(p).collect(),
                None => text,
            }
        }
        'd' | 'i' | 'u' => format!("{}", number(template, conv, value)?.trunc() as i64),
        'x' | 'X' | 'o' => {
            let n = number(template, conv, value)?.trunc() as i64;
            let (sign, magnitude) = if n < 0 { ("-", n.unsigned_abs()) } else { ("", n as u64) };
            let digits = match conv.kind {
                'x' => format!("{:x}", magnitude),
                'X' => format!("{:X}", magnitude),
                _ => format!("{:o}", magnitude),
            };
            let prefix = match (conv.alternate, conv.kind) {
                (true, 'x') => "0x",
                (true, 'X') => "0X",
                (true, _) => "0o",
                _ => "",
            };
            format!("{}{}{}", sign, prefix, digits)
        }
        'f' | 'F' => {
            let v = number(template, conv, value)?;
            format!("{:.*}", conv.precision.unwrap_or(6), v)
        }
        'e' | 'E' => {
            let v = number(template, conv, value)?;
            let text = format_exponential(v, conv.precision.unwrap_or(6));
            if conv.kind == 'E' { text.to_uppercase() } else { text }
        }
        'g' | 'G' => {
            let v = number(template, conv, value)?;
            let text = format_general(v, conv.precision.unwrap_or(6), conv.alternate);
            if conv.kind == 'G' { text.to_uppercase() } else { text }
        }
        other => {
            return Err(LabError::template(
                template,
                format!("unsupported conversion '%{}'", other),
            ));
        }
    };
    Ok(pad(conv, body))
}

fn pad(conv: &Conversion, body: String) -> String {
    let numeric = conv.kind != 's';
    let (sign, digits) = if numeric && body.starts_with('-') {
        ("-", body[1..].to_owned())
    } else if numeric && conv.plus {
        ("+", body)
    } else if numeric && conv.space {
        (" ", body)
    } else {
        ("", body)
    };
    let len = sign.len() + digits.chars().count();
    let width = conv.width.unwrap_or(0);
    if len >= width {
        return format!("{}{}", sign, digits);
    }
    let fill = width - len;
    if conv.left {
        format!("{}{}{}", sign, digits, " ".repeat(fill))
    } else if conv.zero && numeric {
        format!("{}{}{}", sign, "0".repeat(fill), digits)
    } else {
        format!("{}{}{}", " ".repeat(fill), sign, digits)
    }
}

/// `%e`: mantissa with `precision` decimals and a signed, two-digit exponent.
fn format_exponential(v: f64, precision: usize) -> String {
    if !v.is_finite() {
        return non_finite(v);
    }
    let raw = format!("{:.*e}", precision, v);
    match raw.split_once('e') {
        Some((mantissa, exponent)) => {
            let exp: i32 = exponent.parse().unwrap_or(0);
            format!(
                "{}e{}{:02}",
                mantissa,
                if exp < 0 { '-' } else { '+' },
                exp.abs()
            )
        }
        None => raw,
    }
}

/// `%g`: `precision` significant digits, scientific notation for very large
/// or small magnitudes, trailing zeros removed unless `alternate`.
fn format_general(v: f64, precision: usize, alternate: bool) -> String {
    if !v.is_finite() {
        return non_finite(v);
    }
    let p = precision.max(1);
    if v == 0.0 {
        return if alternate {
            format!("{:.*}", p - 1, 0.0)
        } else {
            "0".to_owned()
        };
    }

    let sci = format!("{:.*e}", p - 1, v);
    let exp: i32 = sci
        .split_once('e')
        .and_then(|(_, e)| e.parse().ok())
        .unwrap_or(0);

    if exp < -4 || exp >= p as i32 {
        let text = format_exponential(v, p - 1);
        if alternate {
            return text;
        }
        match text.split_once('e') {
            Some((mantissa, exponent)) => format!("{}e{}", strip_zeros(mantissa), exponent),
            None => text,
        }
    } else {
        let decimals = (p as i32 - 1 - exp).max(0) as usize;
        let text = format!("{:.*}", decimals, v);
        if alternate { text } else { strip_zeros(&text) }
    }
}

fn strip_zeros(text: &str) -> String {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.').to_owned()
    } else {
        text.to_owned()
    }
}

fn non_finite(v: f64) -> String {
    if v.is_nan() {
        "nan".to_owned()
    } else if v > 0.0 {
        "inf".to_owned()
    } else {
        "-inf".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_scope_fills_channel_id() {
        let scope = Scope::new("ch", 3);
        assert_eq!(insert_id("SENS{ch}:FREQ?", &scope).unwrap(), "SENS3:FREQ?");
        assert_eq!(insert_id("*IDN?", &scope).unwrap(), "*IDN?");
    }

    #[test]
    fn nested_scopes_fill_leaf_first() {
        let scopes = [Scope::new("pt", 2), Scope::new("ch", 1)];
        assert_eq!(
            resolve(":SOUR{{ch}}:POW:PORT{pt}?", &scopes).unwrap(),
            ":SOUR1:POW:PORT2?"
        );
    }

    #[test]
    fn unknown_placeholder_is_rejected() {
        let err = insert_id("SENS{tr}:DATA?", &Scope::new("ch", 1)).unwrap_err();
        assert!(matches!(err, LabError::Template { .. }));
        assert!(insert_id("SENS{ch:DATA?", &Scope::new("ch", 1)).is_err());
    }

    #[test]
    fn placeholder_chain_is_checked_up_front() {
        let chain = vec!["pt".to_string(), "ch".to_string()];
        assert!(check_placeholders(":SOUR{{ch}}:POW:PORT{pt}?", &chain).is_ok());
        assert!(check_placeholders(":SOUR{ch}:POW:PORT{pt}?", &chain).is_err());
        assert!(check_placeholders("SENS{ch}:FREQ?", &[]).is_err());
        assert!(check_placeholders("FREQ {{x}}", &[]).is_err());
        assert!(check_placeholders("FREQ?", &[]).is_ok());
    }

    #[test]
    fn general_format_matches_printf() {
        let cases = [
            (500.0, "500"),
            (0.5, "0.5"),
            (1234567.0, "1.23457e+06"),
            (0.0001, "0.0001"),
            (0.00001, "1e-05"),
            (-2.5, "-2.5"),
            (100000.0, "100000"),
            (0.0, "0"),
        ];
        for (v, expected) in cases {
            assert_eq!(format_value("%g", &Value::Float(v)).unwrap(), expected);
        }
    }

    #[test]
    fn conversions_and_flags() {
        assert_eq!(format_value("FREQ %g", &Value::Int(500)).unwrap(), "FREQ 500");
        assert_eq!(format_value("VOLT %.3f", &Value::Float(1.5)).unwrap(), "VOLT 1.500");
        assert_eq!(format_value("CH%d", &Value::Float(2.9)).unwrap(), "CH2");
        assert_eq!(format_value("%e", &Value::Float(12345.678)).unwrap(), "1.234568e+04");
        assert_eq!(format_value("%05d", &Value::Int(-42)).unwrap(), "-0042");
        assert_eq!(format_value("%+d", &Value::Int(7)).unwrap(), "+7");
        assert_eq!(format_value("%-4s|", &Value::from("ab")).unwrap(), "ab  |");
        assert_eq!(format_value("%#x", &Value::Int(255)).unwrap(), "0xff");
        assert_eq!(format_value("DUTY %d%%", &Value::Int(50)).unwrap(), "DUTY 50%");
        assert_eq!(format_value("MODE %s", &Value::from("AC")).unwrap(), "MODE AC");
    }

    #[test]
    fn list_values_fill_several_slots() {
        let value = Value::List(vec![Value::Float(1.5), Value::Int(2)]);
        assert_eq!(format_value("APPL %g,%g", &value).unwrap(), "APPL 1.5,2");
        assert!(format_value("APPL %g", &value).is_err());
        assert!(format_value("OUTP ON", &Value::Int(1)).is_err());
        assert_eq!(count_value_slots("APPL %g,%g %%").unwrap(), 2);
    }

    #[test]
    fn unsupported_conversion_is_a_template_error() {
        assert!(matches!(
            format_value("FREQ %q", &Value::Int(1)),
            Err(LabError::Template { .. })
        ));
    }
}
