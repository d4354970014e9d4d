pub mod hex_slice {
    //! Wrapper type around a slice to print it as a lower-case hex
    //! string.
    use std::fmt;

    /// Wrapper type around a slice to print it as a lower-case hex
    /// string. Implements both [`Display`](fmt::Display) and
    /// [`Debug`](fmt::Debug).
    pub struct HexSlice<'a>(pub &'a [u8]);

    impl<'a> fmt::Debug for HexSlice<'a> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            for b in self.0.iter() {
                write!(f, "{:0>2x}", *b)?;
            }

            Ok(())
        }
    }

    impl<'a> fmt::Display for HexSlice<'a> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{:?}", self)
        }
    }
}

pub mod duration {
    //! Deserialize human-readable durations such as `"30s"` or `"2m"` into
    //! [`std::time::Duration`].
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    fn parse(s: &str) -> Result<Duration, String> {
        let parsed = fundu::DurationParser::with_all_time_units()
            .parse(s)
            .map_err(|e| format!("invalid duration {s:?}: {e}"))?;
        parsed
            .try_into()
            .map_err(|e| format!("duration {s:?} out of range: {e}"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(d)?;
        parse(&s).map_err(D::Error::custom)
    }

    /// Same as the parent module, for `Option<Duration>` fields. Use together with
    /// `#[serde(default)]` so that a missing key maps to `None`.
    pub mod option {
        use super::*;

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
            Option::<String>::deserialize(d)?
                .map(|s| parse(&s).map_err(D::Error::custom))
                .transpose()
        }
    }

    #[cfg(test)]
    mod test {
        use super::*;

        #[test]
        fn parses_units() {
            assert_eq!(parse("30s").unwrap(), Duration::from_secs(30));
            assert_eq!(parse("2m").unwrap(), Duration::from_secs(120));
            assert!(parse("soon").is_err());
        }
    }
}
