/// Layer 1: cheap structural checks before anything else runs.
const MAX_LENGTH: usize = 2048;
const SPECIAL_CHAR_RATIO_LIMIT: f64 = 0.10;
const SPECIAL_CHARS: &[char] = &['<', '>', '{', '}', '[', ']', '\\', '|', '`'];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationFailure {
    TooLong { len: usize, max: usize },
    SpecialCharRatio { ratio_times_1000: u32 },
    ControlCharacter,
}

impl ValidationFailure {
    pub fn reason(&self) -> String {
        match self {
            ValidationFailure::TooLong { len, max } => {
                format!("input length {len} exceeds maximum {max}")
            }
            ValidationFailure::SpecialCharRatio { ratio_times_1000 } => format!(
                "special character ratio {:.3} exceeds limit {SPECIAL_CHAR_RATIO_LIMIT}",
                *ratio_times_1000 as f64 / 1000.0
            ),
            ValidationFailure::ControlCharacter => {
                "input contains a disallowed control character".to_string()
            }
        }
    }
}

pub fn validate(input: &str) -> Result<(), ValidationFailure> {
    let len = input.chars().count();
    if len > MAX_LENGTH {
        return Err(ValidationFailure::TooLong { len, max: MAX_LENGTH });
    }

    if len > 0 {
        let special = input.chars().filter(|c| SPECIAL_CHARS.contains(c)).count();
        let ratio = special as f64 / len as f64;
        if ratio > SPECIAL_CHAR_RATIO_LIMIT {
            return Err(ValidationFailure::SpecialCharRatio {
                ratio_times_1000: (ratio * 1000.0) as u32,
            });
        }
    }

    if input
        .chars()
        .any(|c| c.is_control() && !matches!(c, '\t' | '\n' | '\r'))
    {
        return Err(ValidationFailure::ControlCharacter);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_text() {
        assert!(validate("show me the Q3 invoices for the finance team").is_ok());
    }

    #[test]
    fn rejects_input_over_max_length() {
        let input = "a".repeat(2049);
        assert_eq!(
            validate(&input),
            Err(ValidationFailure::TooLong { len: 2049, max: MAX_LENGTH })
        );
    }

    #[test]
    fn rejects_high_special_char_ratio() {
        let input = "<<<<<<<<<<aaaaa";
        assert!(matches!(
            validate(input),
            Err(ValidationFailure::SpecialCharRatio { .. })
        ));
    }

    #[test]
    fn rejects_c0_control_characters_other_than_tab_lf_cr() {
        let input = "hello\u{0007}world";
        assert_eq!(validate(input), Err(ValidationFailure::ControlCharacter));
    }

    #[test]
    fn allows_tab_lf_cr() {
        assert!(validate("line one\nline two\ttabbed\r\n").is_ok());
    }
}
