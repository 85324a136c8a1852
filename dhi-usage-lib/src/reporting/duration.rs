use super::ReportError;
use core::time::Duration;

const HOUR: u64 = 60 * 60;

/// Parse a trailing-window length such as `7d`, `2w` or `36h`
pub fn parse_relative_duration(s: &str) -> Result<Duration, ReportError> {
    let invalid = || ReportError::InvalidDuration(s.to_string());

    let s = s.trim();
    let Some(unit) = s.chars().last() else {
        return Err(invalid());
    };

    let per_unit = match unit {
        'h' => HOUR,
        'd' => 24 * HOUR,
        'w' => 7 * 24 * HOUR,
        _ => return Err(invalid()),
    };

    // Digits only, so signs and whitespace are rejected
    let count = s.strip_suffix(unit).unwrap_or_default();
    if count.is_empty() || !count.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    let count: u32 = count.parse().map_err(|_| invalid())?;
    Ok(Duration::from_secs(u64::from(count) * per_unit))
}
