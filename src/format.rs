//! Fixed-width latency tokens for the dashboard.

use crate::types::Latency;

/// Every token is exactly this many characters wide.
pub const TOKEN_WIDTH: usize = 5;

/// Shown where no value is available yet.
pub const PLACEHOLDER: &str = "·····";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Right,
}

/// `"150ms"` below one second, `"1.5s"` / `"12.3s"` (three significant
/// digits) above, padded and cut to [`TOKEN_WIDTH`].
pub fn format_latency(latency: Latency, align: Align) -> String {
    let millis = latency.round_millis();
    let text = if millis < 1000 {
        format!("{millis}ms")
    } else {
        format!("{}s", significant3(millis as f64 / 1000.0))
    };

    let padded = match align {
        Align::Left => format!("{text:<TOKEN_WIDTH$}"),
        Align::Right => format!("{text:>TOKEN_WIDTH$}"),
    };
    padded.chars().take(TOKEN_WIDTH).collect()
}

/// Like C's `%.3g`: fixed notation unless the exponent reaches 3, trailing
/// zeros removed.
fn significant3(value: f64) -> String {
    let scientific = format!("{value:.2e}");
    let (mantissa, exponent) = scientific
        .split_once('e')
        .unwrap_or((scientific.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if (-4..3).contains(&exponent) {
        let decimals = (2 - exponent) as usize;
        trim_zeros(format!("{value:.decimals$}"))
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!(
            "{}e{sign}{:02}",
            trim_zeros(mantissa.to_string()),
            exponent.abs()
        )
    }
}

fn trim_zeros(mut text: String) -> String {
    if text.contains('.') {
        let trimmed = text.trim_end_matches('0').trim_end_matches('.').len();
        text.truncate(trimmed);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(millis: i64) -> Latency {
        Latency::from_millis(millis)
    }

    #[test]
    fn sub_second_values_use_milliseconds() {
        assert_eq!(format_latency(ms(150), Align::Left), "150ms");
        assert_eq!(format_latency(ms(7), Align::Left), "7ms  ");
        assert_eq!(format_latency(ms(7), Align::Right), "  7ms");
        assert_eq!(format_latency(ms(0), Align::Left), "0ms  ");
    }

    #[test]
    fn rounds_to_nearest_millisecond() {
        assert_eq!(
            format_latency(Latency::from_nanos(1_499_999), Align::Left),
            "1ms  "
        );
        assert_eq!(
            format_latency(Latency::from_nanos(1_500_000), Align::Left),
            "2ms  "
        );
        assert_eq!(
            format_latency(Latency::from_nanos(999_600_000), Align::Left),
            "1s   "
        );
    }

    #[test]
    fn seconds_keep_three_significant_digits() {
        assert_eq!(format_latency(ms(1000), Align::Left), "1s   ");
        assert_eq!(format_latency(ms(1500), Align::Left), "1.5s ");
        assert_eq!(format_latency(ms(1234), Align::Left), "1.23s");
        assert_eq!(format_latency(ms(12_340), Align::Right), "12.3s");
        assert_eq!(format_latency(ms(123_400), Align::Right), " 123s");
    }

    #[test]
    fn oversized_tokens_are_cut() {
        assert_eq!(format_latency(ms(-15), Align::Left), "-15ms");
        assert_eq!(format_latency(ms(-1500), Align::Left), "-1500");
        assert_eq!(format_latency(ms(1_234_000), Align::Left), "1.23e");
    }

    #[test]
    fn placeholder_is_token_wide() {
        assert_eq!(PLACEHOLDER.chars().count(), TOKEN_WIDTH);
    }
}
