pub mod string {
    use std::fmt::Display;
    use std::str::FromStr;

    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Display,
        S: Serializer,
    {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        T: FromStr,
        T::Err: Display,
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer)?
            .parse()
            .map_err(de::Error::custom)
    }
}

/// Optional regular expressions that must match the whole input.
pub mod opt_regex {
    use regex::Regex;
    use serde::{Deserialize, Deserializer, Serializer, de};

    use crate::manifest::Str;

    pub fn serialize<S>(value: &Option<Regex>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(re) => serializer.serialize_str(unanchor(re.as_str())),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Regex>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<Str>::deserialize(deserializer)?
            .map(|pattern| anchored(&pattern).map_err(de::Error::custom))
            .transpose()
    }

    pub fn anchored(pattern: &str) -> Result<Regex, regex::Error> {
        Regex::new(&format!("^(?:{pattern})$"))
    }

    fn unanchor(pattern: &str) -> &str {
        pattern
            .strip_prefix("^(?:")
            .and_then(|p| p.strip_suffix(")$"))
            .unwrap_or(pattern)
    }

    #[cfg(test)]
    #[test]
    fn anchored_regex_matches_whole_input() {
        let re = anchored("Deploy.*").unwrap();
        assert!(re.is_match("Deployment"));
        assert!(!re.is_match("MyDeployment"));
        assert_eq!(unanchor(re.as_str()), "Deploy.*");
    }
}
