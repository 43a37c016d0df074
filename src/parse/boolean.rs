use super::ParseOutcome;

pub fn string_to_bool(data: &[u8]) -> (bool, ParseOutcome) {
    let trimmed = data.trim_ascii();
    if trimmed.eq_ignore_ascii_case(b"true") {
        (true, ParseOutcome::Success)
    } else if trimmed.eq_ignore_ascii_case(b"false") {
        (false, ParseOutcome::Success)
    } else {
        (false, ParseOutcome::Failure)
    }
}
