use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Canonicalize a raw identifier into a plain decimal-integer string.
///
/// Scientific notation is expanded exactly (`"4.35183164492E11"` becomes
/// `"435183164492"`), decimal literals with an all-zero fraction lose it,
/// everything else comes back trimmed but otherwise as-is.
pub fn normalize(raw: &str) -> String {
    let s = raw.trim();
    if s.is_empty() {
        return String::new();
    }
    if s.contains(['e', 'E']) {
        if let Some(int) = expand_exponent(s) {
            return int;
        }
    }
    if let Some((int, frac)) = s.split_once('.') {
        if is_digits(int) && is_digits(frac) && frac.bytes().all(|b| b == b'0') {
            return strip_leading_zeros(int);
        }
    }
    s.to_string()
}

/// Same policy applied to a JSON value as found in older progress files,
/// where ids were sometimes stored as numbers.
pub fn normalize_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => normalize(s),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.to_string()
            } else if let Some(u) = n.as_u64() {
                u.to_string()
            } else {
                match n.as_f64() {
                    Some(f) if f.is_finite() && f.fract() == 0.0 => format!("{:.0}", f),
                    _ => normalize(&n.to_string()),
                }
            }
        }
        Value::Bool(_) | Value::Array(_) | Value::Object(_) => normalize(&value.to_string()),
    }
}

/// Serde hook for identifier fields that may arrive as strings, numbers or null.
pub fn deserialize<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(normalize_value(&value))
}

/// True for ids the feed can emit as a collection reference.
pub fn is_numeric(id: &str) -> bool {
    is_digits(id)
}

/// Shift the decimal point of a `<mantissa>e<exp>` literal and keep the
/// integer part. Returns None when the text is not a well-formed number.
fn expand_exponent(s: &str) -> Option<String> {
    let (mantissa, exp) = s.split_once(['e', 'E'])?;
    let exp: i64 = exp.parse().ok()?;
    let (sign, mantissa) = match mantissa.as_bytes().first()? {
        b'-' => ("-", &mantissa[1..]),
        b'+' => ("", &mantissa[1..]),
        _ => ("", mantissa),
    };
    let (int, frac) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    if int.is_empty() && frac.is_empty() {
        return None;
    }
    if !(int.is_empty() || is_digits(int)) || !(frac.is_empty() || is_digits(frac)) {
        return None;
    }
    // Guard against absurd exponents blowing up the allocation.
    if exp.unsigned_abs() > 4096 {
        return None;
    }

    let digits = format!("{}{}", int, frac);
    let point = int.len() as i64 + exp;
    let int_part = if point <= 0 {
        String::new()
    } else if point as usize >= digits.len() {
        format!("{}{}", digits, "0".repeat(point as usize - digits.len()))
    } else {
        digits[..point as usize].to_string()
    };

    let int_part = strip_leading_zeros(&int_part);
    if int_part == "0" {
        Some(int_part)
    } else {
        Some(format!("{}{}", sign, int_part))
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn strip_leading_zeros(s: &str) -> String {
    let trimmed = s.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scientific_and_plain_agree() {
        assert_eq!(normalize("435183164492"), "435183164492");
        assert_eq!(normalize("4.35183164492E11"), "435183164492");
        assert_eq!(normalize("4.35183164492e+11"), "435183164492");
    }

    #[test]
    fn idempotent() {
        for raw in [
            "4.35183164492E11",
            "435183164492",
            "12.0",
            "12.5",
            "abc",
            "",
            "  77 ",
            "1e3",
            "007",
            "-2.5e1",
        ] {
            let once = normalize(raw);
            assert_eq!(normalize(&once), once, "not idempotent for {:?}", raw);
        }
    }

    #[test]
    fn zero_fraction_dropped() {
        assert_eq!(normalize("12.0"), "12");
        assert_eq!(normalize("12.000"), "12");
    }

    #[test]
    fn real_fraction_kept() {
        assert_eq!(normalize("12.5"), "12.5");
    }

    #[test]
    fn exponent_truncates() {
        assert_eq!(normalize("1.5e0"), "1");
        assert_eq!(normalize("1e3"), "1000");
        assert_eq!(normalize("-2.5e1"), "-25");
    }

    #[test]
    fn non_numeric_passthrough() {
        assert_eq!(normalize("e-shop"), "e-shop");
        assert_eq!(normalize("  sets "), "sets");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn json_values() {
        assert_eq!(normalize_value(&json!(null)), "");
        assert_eq!(normalize_value(&json!(435183164492_i64)), "435183164492");
        assert_eq!(normalize_value(&json!(435183164492.0)), "435183164492");
        assert_eq!(normalize_value(&json!("4.35183164492E11")), "435183164492");
    }

    #[test]
    fn numeric_check() {
        assert!(is_numeric("9"));
        assert!(!is_numeric(""));
        assert!(!is_numeric("12.5"));
        assert!(!is_numeric("abc"));
    }
}
