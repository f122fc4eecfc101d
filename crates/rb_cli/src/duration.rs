use std::str::FromStr;
use std::time::Duration;

/// Durations written like `30s`, `10m`, `24h`, `1d` or `1h15m30s`. A bare number is seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HumanDuration(pub Duration);

impl FromStr for HumanDuration {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut total_seconds = 0u64;
        let mut current_number = String::new();
        let mut has_unit = false;

        for c in s.trim().chars() {
            if c.is_ascii_digit() {
                current_number.push(c);
            } else if let Ok(num) = current_number.parse::<u64>() {
                let unit = match c {
                    's' => 1,
                    'm' => 60,
                    'h' => 3600,
                    'd' => 86400,
                    _ => return Err(format!("Invalid duration unit: {}", c)),
                };
                total_seconds = num
                    .checked_mul(unit)
                    .and_then(|secs| total_seconds.checked_add(secs))
                    .ok_or_else(|| format!("Duration too large: {}", s))?;
                current_number.clear();
                has_unit = true;
            } else if !c.is_whitespace() {
                return Err(format!("Invalid character in duration: {}", c));
            }
        }

        if !current_number.is_empty() {
            let num = current_number
                .parse::<u64>()
                .map_err(|_| "Invalid number in duration".to_string())?;
            total_seconds = total_seconds
                .checked_add(num)
                .ok_or_else(|| format!("Duration too large: {}", s))?;
            has_unit = true;
        }

        if !has_unit {
            return Err("Duration must include a number".to_string());
        }

        Ok(HumanDuration(Duration::from_secs(total_seconds)))
    }
}

/// Like [`HumanDuration::from_str`] but rejects zero.
pub fn non_zero(s: &str) -> std::result::Result<HumanDuration, String> {
    let duration: HumanDuration = s.parse()?;
    if duration.0.is_zero() {
        return Err("Duration must be greater than zero".to_string());
    }
    Ok(duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_durations() {
        let parse = |s: &str| s.parse::<HumanDuration>().map(|d| d.0.as_secs());
        assert_eq!(parse("30s"), Ok(30));
        assert_eq!(parse("24h"), Ok(86400));
        assert_eq!(parse("1h15m30s"), Ok(4530));
        assert_eq!(parse("45"), Ok(45));
        assert_eq!(parse("2d"), Ok(172800));
        assert!(parse("").is_err());
        assert!(parse("5w").is_err());
        assert!(parse("h").is_err());
    }

    #[test]
    fn test_non_zero() {
        assert_eq!(non_zero("10m").map(|d| d.0.as_secs()), Ok(600));
        assert!(non_zero("0s").is_err());
        assert!(non_zero("0").is_err());
    }
}
