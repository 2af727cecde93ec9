//! Conversions shared between the text based protocols.

use crate::error::DecodeError;

pub const KNOTS_TO_KMH: f64 = 1.852;

/// Maps the battery level code used by H02 devices to a percentage.
/// Unknown codes map to zero.
pub fn battery_percentage(code: i64) -> f64 {
    match code {
        1 => 10.0,
        2 => 20.0,
        3 => 40.0,
        4 => 60.0,
        5 => 80.0,
        6 => 100.0,
        _ => 0.0,
    }
}

/// Parses a decimal field, rejecting `NaN` and infinities.
pub fn parse_finite(text: &str) -> Result<f64, DecodeError> {
    let value = text.parse::<f64>()?;
    if !value.is_finite() {
        return Err(DecodeError::field(format!("{:?} is not a finite number", text)));
    }
    Ok(value)
}

/// Converts a degrees-and-decimal-minutes string such as `2233.1234` to
/// decimal degrees. `degree_digits` is 2 for latitudes and 3 for longitudes.
///
/// The sign of the result is taken from `negate` only.
pub fn ddm_to_degrees(
    degree_digits: usize,
    text: &str,
    negate: bool,
) -> Result<f64, DecodeError> {
    let text = text.strip_prefix('-').unwrap_or(text);
    let (Some(degrees), Some(minutes)) = (text.get(..degree_digits), text.get(degree_digits..))
    else {
        return Err(DecodeError::field(format!("invalid ddm data {:?}", text)));
    };
    if minutes.is_empty() {
        return Err(DecodeError::field(format!("invalid ddm data {:?}", text)));
    }
    let degrees = degrees.parse::<u32>()?;
    let minutes = parse_finite(minutes)?.abs();
    let value = f64::from(degrees) + minutes / 60.0;
    Ok(if negate { -value } else { value })
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn latitude_from_ddm() {
        let lat = ddm_to_degrees(2, "2233.1234", false).unwrap();
        assert!((lat - (22.0 + 33.1234 / 60.0)).abs() < 1e-12);
    }

    #[test]
    fn longitude_from_ddm_west() {
        let lon = ddm_to_degrees(3, "11354.3210", true).unwrap();
        assert!((lon + (113.0 + 54.321 / 60.0)).abs() < 1e-12);
    }

    #[test]
    fn short_ddm_is_rejected() {
        assert!(matches!(
            ddm_to_degrees(3, "113", false),
            Err(DecodeError::FieldParse(_))
        ));
        assert!(ddm_to_degrees(2, "", false).is_err());
    }

    #[test]
    fn non_finite_minutes_are_rejected() {
        for text in ["22NaN", "22inf", "22-inf", "22infinity"] {
            assert!(
                matches!(ddm_to_degrees(2, text, false), Err(DecodeError::FieldParse(_))),
                "{}",
                text
            );
        }
        assert!(matches!(parse_finite("nan"), Err(DecodeError::FieldParse(_))));
        assert_eq!(parse_finite("-1.5").unwrap(), -1.5);
    }

    #[test]
    fn battery_codes() {
        assert_eq!(battery_percentage(1), 10.0);
        assert_eq!(battery_percentage(3), 40.0);
        assert_eq!(battery_percentage(6), 100.0);
        assert_eq!(battery_percentage(0), 0.0);
        assert_eq!(battery_percentage(7), 0.0);
    }

    proptest! {
        #[test]
        fn battery_lookup_is_total(code in any::<i64>()) {
            let percentage = battery_percentage(code);
            if (1..=6).contains(&code) {
                prop_assert!(percentage > 0.0);
            } else {
                prop_assert_eq!(percentage, 0.0);
            }
        }

        #[test]
        fn sign_follows_hemisphere_only(degrees in 0u32..90, minutes in 0.0f64..59.99, south in any::<bool>()) {
            let text = format!("{:02}{:07.4}", degrees, minutes);
            let negated = format!("-{}", text);
            let plain = ddm_to_degrees(2, &text, south).unwrap();
            let from_negated = ddm_to_degrees(2, &negated, south).unwrap();
            prop_assert_eq!(plain, from_negated);
            prop_assert_eq!(plain < 0.0, south && plain != 0.0);
        }
    }
}
