//! DAG-CBOR helpers over `serde_ipld_dagcbor`.
//!
//! Blocks are decoded into [`Ipld`] when only their shape matters (link
//! scanning, signed-message envelopes) and into typed structs otherwise.

use anyhow::{anyhow, Result};
use cid::Cid;
pub use ipld_core::ipld::Ipld;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encode a value as DAG-CBOR. Map keys are written in canonical order.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    serde_ipld_dagcbor::to_vec(value).map_err(|e| anyhow!("failed to encode dag-cbor: {}", e))
}

/// Decode one complete DAG-CBOR value. Trailing bytes are an error.
pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    serde_ipld_dagcbor::from_slice(data).map_err(|e| anyhow!("failed to decode dag-cbor: {}", e))
}

fn collect_links(node: &Ipld, out: &mut Vec<Cid>) {
    match node {
        Ipld::Link(cid) => out.push(*cid),
        Ipld::List(items) => items.iter().for_each(|item| collect_links(item, out)),
        Ipld::Map(entries) => entries.values().for_each(|item| collect_links(item, out)),
        _ => {}
    }
}

/// All links inside a DAG-CBOR block, depth first.
pub fn links(data: &[u8]) -> Result<Vec<Cid>> {
    let mut out = Vec::new();
    collect_links(&decode::<Ipld>(data)?, &mut out);
    Ok(out)
}

/// The encoded first element of a top-level array.
///
/// Signed messages are `[message, signature]`. Chain objects are canonical
/// DAG-CBOR, so re-encoding the message yields the bytes that were signed.
pub fn first_array_element(data: &[u8]) -> Result<Vec<u8>> {
    let items: Vec<Ipld> = decode(data)?;
    let first = items
        .first()
        .ok_or_else(|| anyhow!("expected a non-empty dag-cbor array"))?;
    encode(first)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::{cid_for, DAG_CBOR, RAW};

    #[test]
    fn test_links_found_in_nested_structures() -> Result<()> {
        let a = cid_for(RAW, b"a");
        let b = cid_for(DAG_CBOR, b"b");
        let node = Ipld::Map(BTreeMap::from([
            ("head".to_string(), Ipld::Link(a)),
            (
                "rest".to_string(),
                Ipld::List(vec![Ipld::Integer(-5), Ipld::Link(b), Ipld::Null]),
            ),
        ]));
        let bytes = encode(&node)?;
        assert_eq!(links(&bytes)?, vec![a, b]);
        assert_eq!(decode::<Ipld>(&bytes)?, node);
        Ok(())
    }

    #[test]
    fn test_known_encoding() -> Result<()> {
        // {"a": 1, "b": [2, 3]}
        let bytes = hex::decode("a26161016162820203")?;
        let value: Ipld = decode(&bytes)?;
        let Ipld::Map(entries) = &value else {
            panic!("expected a map, got {:?}", value);
        };
        assert_eq!(entries.get("a"), Some(&Ipld::Integer(1)));
        assert_eq!(encode(&value)?, bytes);
        Ok(())
    }

    #[test]
    fn test_first_array_element_keeps_original_bytes() -> Result<()> {
        let message = encode(&Ipld::List(vec![
            Ipld::Integer(0),
            Ipld::Bytes(vec![1; 30]),
            Ipld::Integer(1000),
        ]))?;
        let signature = Ipld::Bytes(vec![1, 0xaa, 0xbb]);
        let mut signed = vec![0x82];
        signed.extend_from_slice(&message);
        signed.extend_from_slice(&encode(&signature)?);

        assert_eq!(first_array_element(&signed)?, message);
        assert!(first_array_element(&encode(&Ipld::List(vec![]))?).is_err());
        assert!(first_array_element(&encode(&Ipld::Integer(7))?).is_err());
        Ok(())
    }

    #[test]
    fn test_rejects_malformed_input() {
        // Truncated byte string.
        assert!(decode::<Ipld>(&[0x45, 1, 2]).is_err());
        // Trailing garbage.
        assert!(decode::<Ipld>(&[0x01, 0x02]).is_err());
        assert!(links(&[0x82, 0x01]).is_err());
    }
}
