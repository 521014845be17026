//! Serde helpers for boolean flags that feeds send as `0/1` or `true/false`.

use serde::{Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum FlagRepr {
    Bool(bool),
    Int(i64),
}

impl From<FlagRepr> for bool {
    fn from(repr: FlagRepr) -> Self {
        match repr {
            FlagRepr::Bool(b) => b,
            FlagRepr::Int(i) => i != 0,
        }
    }
}

/// `#[serde(default, deserialize_with = "crate::flags::optional")]`
pub fn optional<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<FlagRepr>::deserialize(deserializer)?.map(bool::from))
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Probe {
        #[serde(default, deserialize_with = "super::optional")]
        on: Option<bool>,
    }

    fn parse(json: &str) -> Option<bool> {
        serde_json::from_str::<Probe>(json).unwrap().on
    }

    #[test]
    fn test_flag_forms() {
        assert_eq!(parse(r#"{"on": 1}"#), Some(true));
        assert_eq!(parse(r#"{"on": 0}"#), Some(false));
        assert_eq!(parse(r#"{"on": true}"#), Some(true));
        assert_eq!(parse(r#"{"on": null}"#), None);
        assert_eq!(parse(r#"{}"#), None);
    }

    #[test]
    fn test_flag_rejects_strings() {
        assert!(serde_json::from_str::<Probe>(r#"{"on": "yes"}"#).is_err());
    }
}
