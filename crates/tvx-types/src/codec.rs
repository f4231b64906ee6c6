//! JSON codecs shared by the vector schema and the node API.
//!
//! - CIDs travel as `{"/": "<multibase>"}` links.
//! - Byte strings travel as standard base64; `null` decodes to empty bytes.
//! - Token amounts are arbitrary precision and written as bare JSON numbers.
//!   Decimal strings are accepted on input, as the node API quotes them.

use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

use num_bigint::BigInt;
use serde::de::{self, Visitor};
use serde::ser;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::encoding::{base64_decode, base64_encode};

/// Serde adapter for a single CID in `{"/": "..."}` form.
pub mod cid_json {
    use std::str::FromStr;

    use cid::Cid;
    use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    pub(crate) struct Link {
        #[serde(rename = "/")]
        pub(crate) target: String,
    }

    impl Link {
        pub(crate) fn new(cid: &Cid) -> Self {
            Self {
                target: cid.to_string(),
            }
        }

        pub(crate) fn parse<E: de::Error>(&self) -> Result<Cid, E> {
            Cid::from_str(&self.target)
                .map_err(|e| E::custom(format!("invalid cid '{}': {}", self.target, e)))
        }
    }

    pub fn serialize<S: Serializer>(cid: &Cid, serializer: S) -> Result<S::Ok, S::Error> {
        Link::new(cid).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Cid, D::Error> {
        Link::deserialize(deserializer)?.parse()
    }

    /// Serde adapter for a list of CIDs.
    pub mod vec {
        use cid::Cid;
        use serde::{Deserialize, Deserializer, Serializer};

        use super::Link;

        pub fn serialize<S: Serializer>(cids: &[Cid], serializer: S) -> Result<S::Ok, S::Error> {
            serializer.collect_seq(cids.iter().map(Link::new))
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Vec<Cid>, D::Error> {
            // Lotus encodes an empty key as `null`.
            let links = Option::<Vec<Link>>::deserialize(deserializer)?.unwrap_or_default();
            links.iter().map(|link| link.parse::<D::Error>()).collect()
        }
    }
}

/// Bytes that serialize as a standard base64 string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Base64Bytes(pub Vec<u8>);

impl Base64Bytes {
    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }
}

impl Deref for Base64Bytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for Base64Bytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Base64Bytes {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for Base64Bytes {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl Serialize for Base64Bytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64_encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for Base64Bytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(Self::default()),
            Some(s) => base64_decode(&s, "byte string")
                .map(Self)
                .map_err(de::Error::custom),
        }
    }
}

/// An arbitrary-precision token amount (base fee, circulating supply).
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenAmount(pub BigInt);

impl TokenAmount {
    pub fn from_atto(atto: u64) -> Self {
        Self(BigInt::from(atto))
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TokenAmount {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BigInt::from_str(s.trim())
            .map(Self)
            .map_err(|e| anyhow::anyhow!("invalid token amount '{}': {}", s, e))
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // Always a bare JSON number, whatever its size.
        let number = serde_json::Number::from_str(&self.0.to_string()).map_err(ser::Error::custom)?;
        number.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AmountVisitor;

        impl<'de> Visitor<'de> for AmountVisitor {
            type Value = TokenAmount;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an integer or a decimal integer string")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<TokenAmount, E> {
                Ok(TokenAmount(BigInt::from(v)))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<TokenAmount, E> {
                Ok(TokenAmount(BigInt::from(v)))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<TokenAmount, E> {
                Err(E::custom(format!("token amount {} is not an integer", v)))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<TokenAmount, E> {
                TokenAmount::from_str(v).map_err(E::custom)
            }

            // Numbers wider than 64 bits arrive as serde_json's arbitrary
            // precision number.
            fn visit_map<A: de::MapAccess<'de>>(self, map: A) -> Result<TokenAmount, A::Error> {
                let number =
                    serde_json::Number::deserialize(de::value::MapAccessDeserializer::new(map))?;
                TokenAmount::from_str(&number.to_string()).map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_any(AmountVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_bytes_null_is_empty() {
        let bytes: Base64Bytes = serde_json::from_str("null").unwrap();
        assert!(bytes.is_empty());

        let bytes: Base64Bytes = serde_json::from_str("\"AQID\"").unwrap();
        assert_eq!(&*bytes, &[1, 2, 3]);
        assert_eq!(serde_json::to_string(&bytes).unwrap(), "\"AQID\"");
    }

    #[test]
    fn test_token_amount_number_and_string_forms() {
        let small: TokenAmount = serde_json::from_str("100").unwrap();
        assert_eq!(small, TokenAmount::from_atto(100));
        assert_eq!(serde_json::to_string(&small).unwrap(), "100");

        // Lotus returns base fees as strings.
        let quoted: TokenAmount = serde_json::from_str("\"100\"").unwrap();
        assert_eq!(quoted, small);

        let negative: TokenAmount = serde_json::from_str("-7").unwrap();
        assert_eq!(serde_json::to_string(&negative).unwrap(), "-7");
    }

    #[test]
    fn test_token_amount_wider_than_64_bits_stays_a_number() {
        let huge = "2000000000000000000000000000";
        let bare: TokenAmount = serde_json::from_str(huge).unwrap();
        assert_eq!(bare.to_string(), huge);
        assert_eq!(serde_json::to_string(&bare).unwrap(), huge);

        let quoted: TokenAmount = serde_json::from_str(&format!("\"{}\"", huge)).unwrap();
        assert_eq!(quoted, bare);

        #[derive(Deserialize)]
        struct Pre {
            circ_supply: Option<TokenAmount>,
        }
        let pre: Pre = serde_json::from_str(&format!("{{\"circ_supply\": {}}}", huge)).unwrap();
        assert_eq!(pre.circ_supply, Some(bare));
    }

    #[test]
    fn test_token_amount_rejects_fractions() {
        assert!(serde_json::from_str::<TokenAmount>("1.5").is_err());
        assert!(serde_json::from_str::<TokenAmount>("1e30").is_err());
        assert!(serde_json::from_str::<TokenAmount>("\"abc\"").is_err());
    }
}
