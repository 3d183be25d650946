//! Number verbalization used by date and time normalization.

const ONES: [&str; 20] = [
    "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
    "eleven", "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen", "eighteen",
    "nineteen",
];

const TENS: [&str; 10] = [
    "", "", "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety",
];

const SCALES: [(u64, &str); 3] = [
    (1_000_000_000, "billion"),
    (1_000_000, "million"),
    (1_000, "thousand"),
];

/// Spell out a non-negative integer in English words.
///
/// ```
/// use voxstream_core::text::numbers::cardinal;
/// assert_eq!(cardinal(42), "forty-two");
/// assert_eq!(cardinal(1_305), "one thousand three hundred five");
/// ```
#[must_use]
pub fn cardinal(n: u64) -> String {
    if n < 1000 {
        return below_thousand(n);
    }

    let mut parts = Vec::new();
    let mut rest = n;
    for (scale, name) in SCALES {
        if rest >= scale {
            parts.push(format!("{} {name}", cardinal(rest / scale)));
            rest %= scale;
        }
    }
    if rest > 0 {
        parts.push(below_thousand(rest));
    }
    parts.join(" ")
}

fn below_thousand(n: u64) -> String {
    debug_assert!(n < 1000);
    let hundreds = n / 100;
    let rest = n % 100;

    let tail = if rest < 20 {
        ONES[rest as usize].to_string()
    } else if rest % 10 == 0 {
        TENS[(rest / 10) as usize].to_string()
    } else {
        format!("{}-{}", TENS[(rest / 10) as usize], ONES[(rest % 10) as usize])
    };

    match (hundreds, rest) {
        (0, _) => tail,
        (h, 0) => format!("{} hundred", ONES[h as usize]),
        (h, _) => format!("{} hundred {tail}", ONES[h as usize]),
    }
}

/// Spell out an ordinal ("first", "twenty-second", ...).
#[must_use]
pub fn ordinal(n: u64) -> String {
    let words = cardinal(n);
    let split_at = words.rfind(&['-', ' '][..]).map_or(0, |i| i + 1);
    let (head, last) = words.split_at(split_at);

    let last = match last {
        "one" => "first".to_string(),
        "two" => "second".to_string(),
        "three" => "third".to_string(),
        "five" => "fifth".to_string(),
        "eight" => "eighth".to_string(),
        "nine" => "ninth".to_string(),
        "twelve" => "twelfth".to_string(),
        w if w.ends_with('y') => format!("{}ieth", &w[..w.len() - 1]),
        w => format!("{w}th"),
    };
    format!("{head}{last}")
}

/// Read a calendar year the way it is spoken ("nineteen oh five", "twenty twenty-four").
#[must_use]
pub fn year(n: u64) -> String {
    if !(1000..=9999).contains(&n) || n % 1000 == 0 || (2000..2010).contains(&n) {
        return cardinal(n);
    }

    let century = n / 100;
    let rest = n % 100;
    match rest {
        0 => format!("{} hundred", cardinal(century)),
        1..=9 => format!("{} oh {}", cardinal(century), cardinal(rest)),
        _ => format!("{} {}", cardinal(century), cardinal(rest)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, "zero")]
    #[case(13, "thirteen")]
    #[case(40, "forty")]
    #[case(99, "ninety-nine")]
    #[case(100, "one hundred")]
    #[case(101, "one hundred one")]
    #[case(2_024, "two thousand twenty-four")]
    #[case(1_000_000, "one million")]
    fn test_cardinal(#[case] n: u64, #[case] expected: &str) {
        assert_eq!(cardinal(n), expected);
    }

    #[rstest]
    #[case(1, "first")]
    #[case(2, "second")]
    #[case(3, "third")]
    #[case(5, "fifth")]
    #[case(12, "twelfth")]
    #[case(20, "twentieth")]
    #[case(22, "twenty-second")]
    #[case(31, "thirty-first")]
    fn test_ordinal(#[case] n: u64, #[case] expected: &str) {
        assert_eq!(ordinal(n), expected);
    }

    #[rstest]
    #[case(1999, "nineteen ninety-nine")]
    #[case(1905, "nineteen oh five")]
    #[case(1900, "nineteen hundred")]
    #[case(2000, "two thousand")]
    #[case(2005, "two thousand five")]
    #[case(2024, "twenty twenty-four")]
    fn test_year(#[case] n: u64, #[case] expected: &str) {
        assert_eq!(year(n), expected);
    }
}
