//! Text normalization ahead of segmentation.
//!
//! Dates and clock times are verbalized so the phonemizer never sees raw
//! digits and separators. Anything that does not parse as a real date or time
//! is left exactly as written.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use unicode_normalization::UnicodeNormalization;

use super::numbers::{cardinal, ordinal, year};

static ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b").expect("valid ISO date pattern"));

static US_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").expect("valid US date pattern"));

static CLOCK_TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,2}):(\d{2})(?::(\d{2}))?(?:\s?([AaPp])[Mm]\b)?")
        .expect("valid clock time pattern")
});

const MONTHS: [&str; 12] = [
    "January", "February", "March", "April", "May", "June", "July", "August", "September",
    "October", "November", "December",
];

/// Full normalization pass: NFC, date/time verbalization, whitespace cleanup.
#[must_use]
pub fn normalize_text(text: &str) -> String {
    let composed: String = text.nfc().collect();
    let with_dates = verbalize_dates(&composed);
    let with_times = verbalize_times(&with_dates);
    clean_text(&with_times)
}

/// Collapse whitespace runs (newlines included) into single spaces and trim.
///
/// Punctuation and every other character are kept.
#[must_use]
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Replace ISO (`2024-03-05`) and US (`03/05/2024`) dates with words.
#[must_use]
pub fn verbalize_dates(text: &str) -> String {
    let iso = ISO_DATE.replace_all(text, |caps: &Captures| {
        speak_date(&caps[1], &caps[2], &caps[3]).unwrap_or_else(|| caps[0].to_string())
    });
    US_DATE
        .replace_all(&iso, |caps: &Captures| {
            speak_date(&caps[3], &caps[1], &caps[2]).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Replace `H:MM`, `HH:MM:SS` and `H:MM pm` style clock times with words.
#[must_use]
pub fn verbalize_times(text: &str) -> String {
    CLOCK_TIME
        .replace_all(text, |caps: &Captures| {
            let meridiem = caps.get(4).map(|m| m.as_str().to_ascii_lowercase());
            speak_time(&caps[1], &caps[2], caps.get(3).map(|m| m.as_str()), meridiem.as_deref())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn speak_date(year_str: &str, month_str: &str, day_str: &str) -> Option<String> {
    let y: u64 = year_str.parse().ok()?;
    let m: u64 = month_str.parse().ok()?;
    let d: u64 = day_str.parse().ok()?;

    if !(1..=12).contains(&m) || d == 0 || d > days_in_month(y, m) {
        return None;
    }

    Some(format!("{} {}, {}", MONTHS[(m - 1) as usize], ordinal(d), year(y)))
}

fn days_in_month(y: u64, m: u64) -> u64 {
    match m {
        2 if (y % 4 == 0 && y % 100 != 0) || y % 400 == 0 => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

fn speak_time(
    hour_str: &str,
    minute_str: &str,
    second_str: Option<&str>,
    meridiem: Option<&str>,
) -> Option<String> {
    let hour: u64 = hour_str.parse().ok()?;
    let minute: u64 = minute_str.parse().ok()?;
    let second: u64 = second_str.map_or(Some(0), |s| s.parse().ok())?;

    let hour_valid = match meridiem {
        Some(_) => (1..=12).contains(&hour),
        None => hour <= 23,
    };
    if !hour_valid || minute > 59 || second > 59 {
        return None;
    }

    let mut spoken = match (minute, meridiem) {
        (0, Some(_)) => cardinal(hour),
        (0, None) => format!("{} o'clock", cardinal(hour)),
        (1..=9, _) => format!("{} oh {}", cardinal(hour), cardinal(minute)),
        _ => format!("{} {}", cardinal(hour), cardinal(minute)),
    };

    if second > 0 {
        spoken.push_str(&format!(" and {} seconds", cardinal(second)));
    }
    match meridiem {
        Some("a") => spoken.push_str(" A M"),
        Some(_) => spoken.push_str(" P M"),
        None => {}
    }
    Some(spoken)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Due 2024-03-05.", "Due March fifth, twenty twenty-four.")]
    #[case("Born 12/25/1999 at home", "Born December twenty-fifth, nineteen ninety-nine at home")]
    #[case("Leap day 2024-02-29", "Leap day February twenty-ninth, twenty twenty-four")]
    #[case("Bad 2023-02-29 stays", "Bad 2023-02-29 stays")]
    #[case("Bad 2024-13-01 stays", "Bad 2024-13-01 stays")]
    #[case("Bad 13/40/2024 stays", "Bad 13/40/2024 stays")]
    fn test_verbalize_dates(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(verbalize_dates(input), expected);
    }

    #[rstest]
    #[case("Meet at 10:30", "Meet at ten thirty")]
    #[case("Meet at 9:05", "Meet at nine oh five")]
    #[case("Meet at 14:00", "Meet at fourteen o'clock")]
    #[case("Meet at 5:15pm", "Meet at five fifteen P M")]
    #[case("Meet at 7:00 am", "Meet at seven A M")]
    #[case("Lap 12:30:45", "Lap twelve thirty and forty-five seconds")]
    #[case("Broken 25:61", "Broken 25:61")]
    #[case("Broken 13:10 pm", "Broken 13:10 pm")]
    fn test_verbalize_times(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(verbalize_times(input), expected);
    }

    #[test]
    fn test_clean_text_preserves_punctuation() {
        let cleaned = clean_text("  Hello,\n\n world!\t(yes)  ");
        assert_eq!(cleaned, "Hello, world! (yes)");
    }

    #[test]
    fn test_normalize_text_composes_unicode() {
        let decomposed = "Cafe\u{0301} opens at 8:00";
        assert_eq!(normalize_text(decomposed), "Caf\u{e9} opens at eight o'clock");
    }

    #[test]
    fn test_normalize_empty() {
        assert_eq!(normalize_text("   \n\t "), "");
    }
}
