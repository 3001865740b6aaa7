//! Decodes raw text lines coming from the sensor firmware. A data line
//! carries a numeral somewhere in it (possibly surrounded by labels or
//! units); anything without a numeral is a human-readable diagnostic and
//! is reported as such rather than treated as an error.

use nom::{
    branch::alt,
    character::complete::{char, digit0, digit1, one_of},
    combinator::{map_res, opt, recognize},
    sequence::{pair, tuple},
    IResult,
};

/// Matches a decimal numeral such as `12.5` or `.5`.
fn decimal(s: &str) -> IResult<&str, &str> {
    recognize(tuple((digit0, char('.'), digit1)))(s)
}

/// Matches a signed decimal or integer numeral at the start of the input.
fn numeral(s: &str) -> IResult<&str, f64> {
    map_res(
        recognize(pair(opt(one_of("+-")), alt((decimal, digit1)))),
        str::parse::<f64>,
    )(s)
}

/// Extracts the first signed decimal or integer numeral found anywhere in
/// `line`, or `None` when the line carries no numeral at all.
///
/// The device interleaves readings with status text ("ZERO_OK", boot
/// banners, ...), so a miss here is an expected outcome, not a failure.
pub fn first_reading(line: &str) -> Option<f64> {
    line.char_indices()
        .find_map(|(idx, _)| numeral(&line[idx..]).ok().map(|(_, value)| value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_integer() {
        assert_eq!(first_reading("42"), Some(42.0));
    }

    #[test]
    fn plain_decimal() {
        assert_eq!(first_reading("87.25"), Some(87.25));
    }

    #[test]
    fn signed_values() {
        assert_eq!(first_reading("-12.5"), Some(-12.5));
        assert_eq!(first_reading("-5"), Some(-5.0));
        assert_eq!(first_reading("+3.75"), Some(3.75));
    }

    #[test]
    fn numeral_with_surrounding_text() {
        assert_eq!(first_reading("ROM: 45.2 deg"), Some(45.2));
        assert_eq!(first_reading("fuerza=12.50kg"), Some(12.5));
    }

    #[test]
    fn first_of_several() {
        assert_eq!(first_reading("12.3,45.6,78.9"), Some(12.3));
    }

    #[test]
    fn bare_fraction() {
        assert_eq!(first_reading("drift .5 deg"), Some(0.5));
    }

    #[test]
    fn diagnostic_lines_have_no_reading() {
        assert_eq!(first_reading("ZERO_OK"), None);
        assert_eq!(first_reading("BNO ready"), None);
        assert_eq!(first_reading(""), None);
        assert_eq!(first_reading("..."), None);
    }
}
