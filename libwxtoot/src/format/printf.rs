//! printf-style formatting of a single observation value
//!
//! Supports one conversion per pattern (`%s %d %i %u %f %F %e %E %g %G %x %X %o`)
//! with the `- 0 + space #` flags, width and precision. `%%` is a literal
//! percent sign and any text around the conversion is kept as is.

use thiserror::Error;

use crate::types::ObservationValue;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("incomplete conversion in '{0}'")]
    Incomplete(String),

    #[error("unsupported conversion '%{0}'")]
    Unsupported(char),

    #[error("'%{conv}' cannot format {value}")]
    TypeMismatch { conv: char, value: String },

    #[error("pattern '{0}' must contain exactly one conversion")]
    ConversionCount(String),
}

#[derive(Debug, Default, Clone, Copy)]
struct Conversion {
    left: bool,
    zero: bool,
    plus: bool,
    space: bool,
    alt: bool,
    width: Option<usize>,
    precision: Option<usize>,
    conv: char,
}

/// Apply `pattern` to `value`.
pub fn format_value(pattern: &str, value: &ObservationValue) -> Result<String, FormatError> {
    let mut out = String::new();
    let mut converted = false;
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'%') {
            chars.next();
            out.push('%');
            continue;
        }
        if converted {
            return Err(FormatError::ConversionCount(pattern.to_string()));
        }

        let mut spec = Conversion::default();
        while let Some(&flag) = chars.peek() {
            match flag {
                '-' => spec.left = true,
                '0' => spec.zero = true,
                '+' => spec.plus = true,
                ' ' => spec.space = true,
                '#' => spec.alt = true,
                _ => break,
            }
            chars.next();
        }
        spec.width = take_number(&mut chars);
        if chars.peek() == Some(&'.') {
            chars.next();
            spec.precision = Some(take_number(&mut chars).unwrap_or(0));
        }
        // length modifiers carry no meaning here
        while matches!(chars.peek(), Some('l' | 'h' | 'L')) {
            chars.next();
        }
        spec.conv = chars
            .next()
            .ok_or_else(|| FormatError::Incomplete(pattern.to_string()))?;

        out.push_str(&convert(&spec, value)?);
        converted = true;
    }

    if !converted {
        return Err(FormatError::ConversionCount(pattern.to_string()));
    }
    Ok(out)
}

fn take_number(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<usize> {
    let mut digits = String::new();
    while let Some(&d) = chars.peek() {
        if !d.is_ascii_digit() {
            break;
        }
        digits.push(d);
        chars.next();
    }
    digits.parse().ok()
}

fn convert(spec: &Conversion, value: &ObservationValue) -> Result<String, FormatError> {
    let mismatch = || FormatError::TypeMismatch {
        conv: spec.conv,
        value: value.to_string(),
    };

    match spec.conv {
        's' | 'r' => {
            let text = match (spec.conv, value) {
                ('r', ObservationValue::Text(t)) => format!("'{}'", t),
                _ => value.to_string(),
            };
            let text = match spec.precision {
                Some(p) => text.chars().take(p).collect(),
                None => text,
            };
            Ok(pad(text, spec, false))
        }
        'd' | 'i' | 'u' => {
            let v = integer(value).ok_or_else(mismatch)?;
            Ok(pad(signed(v < 0, v.unsigned_abs().to_string(), spec), spec, true))
        }
        'x' | 'X' | 'o' => {
            let v = integer(value).ok_or_else(mismatch)?;
            let magnitude = v.unsigned_abs();
            let body = match (spec.conv, spec.alt) {
                ('x', false) => format!("{:x}", magnitude),
                ('x', true) => format!("{:#x}", magnitude),
                ('X', false) => format!("{:X}", magnitude),
                ('X', true) => format!("0X{:X}", magnitude),
                (_, false) => format!("{:o}", magnitude),
                (_, true) => format!("0o{:o}", magnitude),
            };
            Ok(pad(signed(v < 0, body, spec), spec, true))
        }
        'f' | 'F' | 'e' | 'E' | 'g' | 'G' => {
            let v = float(value).ok_or_else(mismatch)?;
            let body = if v.is_finite() {
                let abs = v.abs();
                let precision = spec.precision.unwrap_or(6);
                match spec.conv {
                    'f' | 'F' => format!("{:.*}", precision, abs),
                    'e' => exponent(abs, precision),
                    'E' => exponent(abs, precision).to_uppercase(),
                    'g' => general(abs, precision, spec.alt),
                    _ => general(abs, precision, spec.alt).to_uppercase(),
                }
            } else if v.is_nan() {
                "nan".to_string()
            } else {
                "inf".to_string()
            };
            let body = if spec.conv.is_ascii_uppercase() {
                body.to_uppercase()
            } else {
                body
            };
            let negative = v.is_sign_negative() && !v.is_nan() && v != 0.0;
            Ok(pad(signed(negative, body, spec), spec, v.is_finite()))
        }
        other => Err(FormatError::Unsupported(other)),
    }
}

fn integer(value: &ObservationValue) -> Option<i64> {
    match value {
        ObservationValue::Integer(v) => Some(*v),
        ObservationValue::Float(v) if v.is_finite() => Some(v.trunc() as i64),
        _ => None,
    }
}

fn float(value: &ObservationValue) -> Option<f64> {
    match value {
        ObservationValue::Integer(v) => Some(*v as f64),
        ObservationValue::Float(v) => Some(*v),
        _ => None,
    }
}

fn signed(negative: bool, body: String, spec: &Conversion) -> String {
    if negative {
        format!("-{}", body)
    } else if spec.plus {
        format!("+{}", body)
    } else if spec.space {
        format!(" {}", body)
    } else {
        body
    }
}

/// `d.dddddde+XX` with at least two exponent digits
fn exponent(abs: f64, precision: usize) -> String {
    let raw = format!("{:.*e}", precision, abs);
    let (mantissa, exp) = raw.split_once('e').unwrap_or((raw.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let sign = if exp < 0 { '-' } else { '+' };
    format!("{}e{}{:02}", mantissa, sign, exp.abs())
}

/// `%g`: fixed or exponent notation depending on magnitude, trailing zeros dropped
fn general(abs: f64, precision: usize, keep_zeros: bool) -> String {
    let significant = precision.max(1);
    if abs == 0.0 {
        return if keep_zeros {
            format!("{:.*}", significant - 1, 0.0)
        } else {
            "0".to_string()
        };
    }
    let raw = format!("{:.*e}", significant - 1, abs);
    let exp: i32 = raw
        .split_once('e')
        .and_then(|(_, e)| e.parse().ok())
        .unwrap_or(0);

    if exp < -4 || exp >= significant as i32 {
        let formatted = exponent(abs, significant - 1);
        if keep_zeros {
            return formatted;
        }
        match formatted.split_once('e') {
            Some((mantissa, exp)) => format!("{}e{}", strip_zeros(mantissa), exp),
            None => formatted,
        }
    } else {
        let decimals = (significant as i32 - 1 - exp).max(0) as usize;
        let formatted = format!("{:.*}", decimals, abs);
        if keep_zeros {
            formatted
        } else {
            strip_zeros(&formatted).to_string()
        }
    }
}

fn strip_zeros(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

fn pad(body: String, spec: &Conversion, numeric: bool) -> String {
    let width = spec.width.unwrap_or(0);
    let len = body.chars().count();
    if len >= width {
        return body;
    }
    let fill = width - len;
    if spec.left {
        format!("{}{}", body, " ".repeat(fill))
    } else if spec.zero && numeric {
        let split = if body.starts_with(['-', '+', ' ']) { 1 } else { 0 };
        let (sign, digits) = body.split_at(split);
        format!("{}{}{}", sign, "0".repeat(fill), digits)
    } else {
        format!("{}{}", " ".repeat(fill), body)
    }
}
