use std::str::FromStr;

use super::ParseOutcome;

fn is_explicit_infinity(text: &str) -> bool {
    let unsigned = text.trim_start_matches(['+', '-']).as_bytes();
    unsigned.len() >= 3 && unsigned[..3].eq_ignore_ascii_case(b"inf")
}

fn parse_float<T>(data: &[u8]) -> (T, ParseOutcome)
where
    T: FromStr + Default + Copy + Into<f64>,
{
    let Ok(text) = std::str::from_utf8(data.trim_ascii()) else {
        return (T::default(), ParseOutcome::Failure);
    };
    match text.parse::<T>() {
        Ok(value) if value.into().is_infinite() && !is_explicit_infinity(text) => {
            (value, ParseOutcome::Overflow)
        }
        Ok(value) => (value, ParseOutcome::Success),
        Err(_) => (T::default(), ParseOutcome::Failure),
    }
}

pub fn string_to_float(data: &[u8]) -> (f32, ParseOutcome) {
    parse_float(data)
}

pub fn string_to_double(data: &[u8]) -> (f64, ParseOutcome) {
    parse_float(data)
}
