//! Serialize `u64` seeds as decimal strings so browser clients never lose
//! precision past 2^53. Deserialization accepts either form.

use serde::de::Error;
use serde::{Deserialize, Deserializer, Serializer};

pub fn serialize<S>(value: &u64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&value.to_string())
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u64),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(value) => Ok(value),
        Raw::Text(text) => text
            .parse::<u64>()
            .map_err(|_| D::Error::custom(format!("not a u64: {text:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
    struct Wrapper {
        #[serde(with = "super")]
        seed: u64,
    }

    #[test]
    fn serializes_as_string() {
        let text = serde_json::to_string(&Wrapper { seed: u64::MAX }).expect("serialize");
        assert_eq!(text, format!(r#"{{"seed":"{}"}}"#, u64::MAX));
    }

    #[test]
    fn deserialize_accepts_string() {
        let parsed: Wrapper = serde_json::from_str(r#"{"seed":"1337"}"#).expect("string seed");
        assert_eq!(parsed.seed, 1337);
    }

    #[test]
    fn deserialize_accepts_number() {
        let parsed: Wrapper = serde_json::from_str(r#"{"seed":1337}"#).expect("numeric seed");
        assert_eq!(parsed.seed, 1337);
    }
}
