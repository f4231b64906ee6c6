//! CARv1 archive reader and writer.
//!
//! Layout: `varint(len) || dag-cbor {roots, version: 1}` followed by sections of
//! `varint(len) || cid bytes || block data`.

use std::io::{BufRead, BufReader, Cursor, Read, Write};

use anyhow::{anyhow, bail, Context, Result};
use cid::Cid;
use serde::{Deserialize, Serialize};
use unsigned_varint::{encode as varint, io::read_u64};

use crate::dagcbor;
use crate::Blockstore;

/// Largest section accepted by the reader.
const MAX_SECTION_LEN: u64 = 32 << 20;

#[derive(Debug, Serialize, Deserialize)]
struct CarHeader {
    roots: Vec<Cid>,
    version: u64,
}

fn write_varint<W: Write>(writer: &mut W, value: u64) -> Result<()> {
    let mut buf = varint::u64_buffer();
    writer
        .write_all(varint::u64(value, &mut buf))
        .context("Failed to write car varint")
}

/// Read a section length. Returns `None` on a clean end of input.
fn read_varint<R: BufRead>(reader: &mut R) -> Result<Option<u64>> {
    if reader
        .fill_buf()
        .context("Failed to read car stream")?
        .is_empty()
    {
        return Ok(None);
    }
    read_u64(reader)
        .map(Some)
        .map_err(|e| anyhow!("invalid varint in car stream: {}", e))
}

/// Streams blocks into a CARv1 archive.
pub struct CarWriter<W: Write> {
    writer: W,
    blocks: usize,
}

impl<W: Write> CarWriter<W> {
    /// Write the header and return a writer ready for blocks.
    pub fn new(mut writer: W, roots: &[Cid]) -> Result<Self> {
        let header = dagcbor::encode(&CarHeader {
            roots: roots.to_vec(),
            version: 1,
        })?;
        write_varint(&mut writer, header.len() as u64)?;
        writer
            .write_all(&header)
            .context("Failed to write car header")?;
        Ok(Self { writer, blocks: 0 })
    }

    pub fn write_block(&mut self, cid: &Cid, data: &[u8]) -> Result<()> {
        let cid_bytes = cid.to_bytes();
        write_varint(&mut self.writer, (cid_bytes.len() + data.len()) as u64)?;
        self.writer
            .write_all(&cid_bytes)
            .and_then(|_| self.writer.write_all(data))
            .map_err(|e| anyhow!("Failed to write car block {}: {}", cid, e))?;
        self.blocks += 1;
        Ok(())
    }

    pub fn blocks_written(&self) -> usize {
        self.blocks
    }

    /// Flush and hand back the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        self.writer.flush().context("Failed to flush car writer")?;
        Ok(self.writer)
    }
}

/// Reads blocks back out of a CARv1 archive.
pub struct CarReader<R: Read> {
    reader: BufReader<R>,
    roots: Vec<Cid>,
}

impl<R: Read> CarReader<R> {
    pub fn new(reader: R) -> Result<Self> {
        let mut reader = BufReader::new(reader);
        let len = read_varint(&mut reader)?.ok_or_else(|| anyhow!("empty car archive"))?;
        if len == 0 || len > MAX_SECTION_LEN {
            bail!("invalid car header length {}", len);
        }
        let mut header = vec![0u8; len as usize];
        reader
            .read_exact(&mut header)
            .context("Failed to read car header")?;
        let header: CarHeader =
            dagcbor::decode(&header).context("Failed to decode car header")?;
        if header.version != 1 {
            bail!("unsupported car version {}", header.version);
        }

        Ok(Self {
            reader,
            roots: header.roots,
        })
    }

    pub fn roots(&self) -> &[Cid] {
        &self.roots
    }

    /// Next `(cid, data)` section, or `None` at the end of the archive.
    pub fn next_block(&mut self) -> Result<Option<(Cid, Vec<u8>)>> {
        let Some(len) = read_varint(&mut self.reader)? else {
            return Ok(None);
        };
        if len == 0 || len > MAX_SECTION_LEN {
            bail!("invalid car section length {}", len);
        }
        let mut section = vec![0u8; len as usize];
        self.reader
            .read_exact(&mut section)
            .context("truncated car section")?;

        let mut cursor = Cursor::new(section.as_slice());
        let cid = Cid::read_bytes(&mut cursor)
            .map_err(|e| anyhow!("invalid cid in car section: {}", e))?;
        let data = section[cursor.position() as usize..].to_vec();
        Ok(Some((cid, data)))
    }
}

/// Load every block of an archive into `store`, returning the archive roots.
pub fn load_car<S: Blockstore + ?Sized, R: Read>(store: &S, reader: R) -> Result<Vec<Cid>> {
    let mut car = CarReader::new(reader)?;
    let mut loaded = 0usize;
    while let Some((cid, data)) = car.next_block()? {
        store.put_keyed(&cid, &data)?;
        loaded += 1;
    }
    tracing::debug!(blocks = loaded, roots = car.roots().len(), "loaded car archive");
    Ok(car.roots)
}
