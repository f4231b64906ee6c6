//! Minimal-closure archive writer.
//!
//! Given the set of objects an execution touched, writes exactly the part of
//! the state graph reachable from the roots through touched objects.

use std::collections::HashSet;
use std::io::{Read, Write};

use anyhow::{Context, Result};
use cid::Cid;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::debug;
use tvx_blockstore::car::{load_car, CarWriter};
use tvx_blockstore::{dagcbor, Blockstore, DAG_CBOR, FIL_COMMITMENT_SEALED, FIL_COMMITMENT_UNSEALED};

use crate::errors::ConformanceError;

fn is_commitment(cid: &Cid) -> bool {
    matches!(cid.codec(), FIL_COMMITMENT_UNSEALED | FIL_COMMITMENT_SEALED)
}

/// Write a CARv1 archive of `roots` plus every object in `include` reachable
/// from them through objects in `include`.
///
/// Roots are always written. Each object is written once. Links to
/// commitments are never followed. An included object missing from `store`
/// is a [`ConformanceError::BrokenClosure`].
pub fn write_car_including<W: Write>(
    store: &dyn Blockstore,
    writer: W,
    include: &HashSet<Cid>,
    roots: &[Cid],
) -> Result<W> {
    let mut car = CarWriter::new(writer, roots)?;
    let mut seen: HashSet<Cid> = HashSet::new();
    // (object, parent) pairs; roots have no parent.
    let mut stack: Vec<(Cid, Option<Cid>)> = roots.iter().rev().map(|r| (*r, None)).collect();

    while let Some((cid, parent)) = stack.pop() {
        if !seen.insert(cid) {
            continue;
        }
        let data = match store.get(&cid)? {
            Some(data) => data,
            None => {
                return Err(match parent {
                    Some(parent) => ConformanceError::BrokenClosure { cid, parent },
                    None => ConformanceError::MissingObject { cid },
                }
                .into())
            }
        };
        car.write_block(&cid, &data)?;

        if cid.codec() != DAG_CBOR {
            continue;
        }
        let links = dagcbor::links(&data)
            .with_context(|| format!("failed to scan links of {}", cid))?;
        for link in links.into_iter().rev() {
            if is_commitment(&link) || seen.contains(&link) || !include.contains(&link) {
                continue;
            }
            stack.push((link, Some(cid)));
        }
    }

    debug!(
        blocks = car.blocks_written(),
        included = include.len(),
        "wrote state closure"
    );
    car.finish()
}

/// Write the closure as a gzip-compressed archive.
///
/// The compressed stream is finished before the bytes are returned; on any
/// error the partial buffer is dropped.
pub fn write_gzipped_car(
    store: &dyn Blockstore,
    include: &HashSet<Cid>,
    roots: &[Cid],
) -> Result<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut encoder = write_car_including(store, encoder, include, roots)?;
    encoder.flush().context("failed to flush compressed archive")?;
    encoder.finish().context("failed to finish compressed archive")
}

/// Load a gzip-compressed archive into `store`, returning its roots.
pub fn load_gzipped_car<S: Blockstore + ?Sized>(store: &S, compressed: &[u8]) -> Result<Vec<Cid>> {
    let decoder = GzDecoder::new(compressed);
    load_car(store, decoder).context("failed to load vector archive")
}

/// Decompress and list an archive's blocks, for inspection.
pub fn read_gzipped_car(compressed: &[u8]) -> Result<(Vec<Cid>, Vec<(Cid, Vec<u8>)>)> {
    let mut decoder = GzDecoder::new(compressed);
    let mut raw = Vec::new();
    decoder
        .read_to_end(&mut raw)
        .context("failed to decompress archive")?;
    let mut reader = tvx_blockstore::car::CarReader::new(raw.as_slice())?;
    let roots = reader.roots().to_vec();
    let mut blocks = Vec::new();
    while let Some(block) = reader.next_block()? {
        blocks.push(block);
    }
    Ok((roots, blocks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use multihash_codetable::{Code, MultihashDigest};
    use tvx_blockstore::{MemoryBlockstore, RAW};

    fn put_node(store: &MemoryBlockstore, links: Vec<Cid>) -> Cid {
        store
            .put(DAG_CBOR, &dagcbor::encode(&links).unwrap())
            .unwrap()
    }

    #[test]
    fn test_only_included_links_are_followed() -> Result<()> {
        let store = MemoryBlockstore::new();
        let touched = store.put(RAW, b"touched")?;
        let untouched = store.put(RAW, b"untouched")?;
        let commitment = Cid::new_v1(FIL_COMMITMENT_SEALED, Code::Sha2_256.digest(b"sector"));
        let mid = put_node(&store, vec![touched, untouched, commitment]);
        let root = put_node(&store, vec![mid, mid]);

        let include = HashSet::from([mid, touched, commitment]);
        let compressed = write_gzipped_car(&store, &include, &[root])?;
        let (roots, blocks) = read_gzipped_car(&compressed)?;

        assert_eq!(roots, vec![root]);
        let written: Vec<Cid> = blocks.iter().map(|(c, _)| *c).collect();
        assert_eq!(written, vec![root, mid, touched]);
        Ok(())
    }

    #[test]
    fn test_roots_written_even_when_not_traced() -> Result<()> {
        let store = MemoryBlockstore::new();
        let pre = store.put(RAW, b"pre")?;
        let post = store.put(RAW, b"post")?;
        let (_, blocks) =
            read_gzipped_car(&write_gzipped_car(&store, &HashSet::new(), &[pre, post, pre])?)?;
        assert_eq!(blocks.len(), 2);
        Ok(())
    }

    #[test]
    fn test_missing_included_object_breaks_closure() {
        let store = MemoryBlockstore::new();
        let ghost = Cid::new_v1(RAW, Code::Blake2b256.digest(b"ghost"));
        let root = put_node(&store, vec![ghost]);

        let err = write_gzipped_car(&store, &HashSet::from([ghost]), &[root]).unwrap_err();
        match ConformanceError::find(&err) {
            Some(ConformanceError::BrokenClosure { cid, parent }) => {
                assert_eq!((*cid, *parent), (ghost, root));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_archive_loads_back_into_store() -> Result<()> {
        let source = MemoryBlockstore::new();
        let leaf = source.put(RAW, b"leaf")?;
        let root = put_node(&source, vec![leaf]);
        let compressed = write_gzipped_car(&source, &HashSet::from([leaf]), &[root])?;

        let target = MemoryBlockstore::new();
        assert_eq!(load_gzipped_car(&target, &compressed)?, vec![root]);
        assert_eq!(target.get(&leaf)?, Some(b"leaf".to_vec()));
        Ok(())
    }
}
