use super::ParseOutcome;

/// Decimal text to a signed integer bounded by `[min, max]`.
///
/// Surrounding ASCII whitespace and one leading sign are accepted. Out of
/// range input reports [`ParseOutcome::Overflow`] with the value saturated.
fn parse_signed(data: &[u8], min: i64, max: i64) -> (i64, ParseOutcome) {
    let trimmed = data.trim_ascii();
    let (negative, digits) = match trimmed.split_first() {
        Some((b'-', rest)) => (true, rest),
        Some((b'+', rest)) => (false, rest),
        _ => (false, trimmed),
    };
    if digits.is_empty() {
        return (0, ParseOutcome::Failure);
    }

    let limit = if negative { min.unsigned_abs() } else { max as u64 };
    let mut magnitude: u64 = 0;
    let mut overflow = false;
    for &byte in digits {
        if !byte.is_ascii_digit() {
            return (0, ParseOutcome::Failure);
        }
        if overflow {
            continue;
        }
        match magnitude
            .checked_mul(10)
            .and_then(|acc| acc.checked_add(u64::from(byte - b'0')))
        {
            Some(acc) if acc <= limit => magnitude = acc,
            _ => overflow = true,
        }
    }

    if overflow {
        let saturated = if negative { min } else { max };
        return (saturated, ParseOutcome::Overflow);
    }
    let value = if negative {
        (magnitude as i64).wrapping_neg()
    } else {
        magnitude as i64
    };
    (value, ParseOutcome::Success)
}

pub fn string_to_int8(data: &[u8]) -> (i8, ParseOutcome) {
    let (value, outcome) = parse_signed(data, i8::MIN.into(), i8::MAX.into());
    (value as i8, outcome)
}

pub fn string_to_int16(data: &[u8]) -> (i16, ParseOutcome) {
    let (value, outcome) = parse_signed(data, i16::MIN.into(), i16::MAX.into());
    (value as i16, outcome)
}

pub fn string_to_int32(data: &[u8]) -> (i32, ParseOutcome) {
    let (value, outcome) = parse_signed(data, i32::MIN.into(), i32::MAX.into());
    (value as i32, outcome)
}

pub fn string_to_int64(data: &[u8]) -> (i64, ParseOutcome) {
    parse_signed(data, i64::MIN, i64::MAX)
}
