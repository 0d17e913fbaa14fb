use std::io::{self, Read, Seek, SeekFrom};

use crate::chunker::{self, Chunker};
use crate::cursor::Cursor;
use crate::edit::splice_indexed;
use crate::error::{ValueError, ValueResult};
use crate::kind::Kind;
use crate::sequence::{Item, Sequence, SequenceItems};
use crate::store::{ValueReadWriter, ValueReader};

/// An immutable byte string, chunked by content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Blob {
    seq: Sequence,
}

impl Blob {
    pub fn new(vw: &dyn ValueReadWriter, data: &[u8]) -> ValueResult<Self> {
        let mut chunker = Chunker::new(vw, Kind::Blob);
        for b in data {
            chunker.append(Item::Byte(*b))?;
        }
        Ok(Self::from_sequence(chunker.done()?))
    }

    pub fn empty() -> Self {
        Self::from_sequence(Sequence::empty(Kind::Blob))
    }

    pub(crate) fn from_sequence(seq: Sequence) -> Self {
        Self { seq }
    }

    pub fn sequence(&self) -> &Sequence {
        &self.seq
    }

    pub fn len(&self) -> u64 {
        self.seq.num_leaves()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy bytes starting at `offset` into `buf`; returns the count copied,
    /// which is 0 at or past the end.
    pub fn read_at(&self, vr: &dyn ValueReader, offset: u64, buf: &mut [u8]) -> ValueResult<usize> {
        if buf.is_empty() || offset >= self.len() {
            return Ok(0);
        }
        let mut cur = Cursor::at_index(vr, &self.seq, offset)?;
        if vr.read_ahead() > 0 {
            cur = cur.with_read_ahead(vr.read_ahead());
        }
        let mut copied = 0;
        while copied < buf.len() && cur.valid() {
            let SequenceItems::Bytes(bytes) = cur.seq().items() else {
                return Err(ValueError::KindMismatch {
                    expected: Kind::Blob,
                    actual: cur.seq().kind(),
                });
            };
            let bytes = bytes.clone();
            let start = cur.idx().max(0) as usize;
            let n = (bytes.len() - start).min(buf.len() - copied);
            buf[copied..copied + n].copy_from_slice(&bytes[start..start + n]);
            copied += n;
            if copied == buf.len() {
                break;
            }
            // Jump to the last byte of this leaf so one step crosses into the next.
            cur.set_idx(bytes.len() as isize - 1);
            if !cur.advance(vr)? {
                break;
            }
        }
        Ok(copied)
    }

    pub fn to_vec(&self, vr: &dyn ValueReader) -> ValueResult<Vec<u8>> {
        let len = usize::try_from(self.len()).map_err(|_| ValueError::IndexOutOfBounds {
            index: self.len(),
            len: usize::MAX as u64,
        })?;
        let mut out = vec![0; len];
        let n = self.read_at(vr, 0, &mut out)?;
        out.truncate(n);
        Ok(out)
    }

    /// A `Read + Seek` view of the bytes.
    pub fn reader<'a>(&self, vr: &'a dyn ValueReader) -> BlobReader<'a> {
        BlobReader {
            blob: self.clone(),
            vr,
            pos: 0,
        }
    }

    /// Replace `delete` bytes at `offset` with `insert`.
    pub fn splice(&self, vw: &dyn ValueReadWriter, offset: u64, delete: u64, insert: &[u8]) -> ValueResult<Self> {
        let seq = splice_indexed(vw, &self.seq, offset, delete, insert.iter().map(|b| Item::Byte(*b)))?;
        Ok(Self::from_sequence(seq))
    }

    /// This blob followed by `other`; only chunks near the seam are rebuilt.
    pub fn concat(&self, vw: &dyn ValueReadWriter, other: &Blob) -> ValueResult<Self> {
        Ok(Self::from_sequence(chunker::concat(vw, &self.seq, &other.seq)?))
    }
}

/// Streaming reader over a [`Blob`].
pub struct BlobReader<'a> {
    blob: Blob,
    vr: &'a dyn ValueReader,
    pos: u64,
}

impl Read for BlobReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.blob.read_at(self.vr, self.pos, buf).map_err(io::Error::other)?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for BlobReader<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => Some(p),
            SeekFrom::End(d) => self.blob.len().checked_add_signed(d),
            SeekFrom::Current(d) => self.pos.checked_add_signed(d),
        };
        let target = target.ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "seek before start of blob"))?;
        self.pos = target;
        Ok(target)
    }
}

impl std::fmt::Debug for BlobReader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobReader")
            .field("len", &self.blob.len())
            .field("pos", &self.pos)
            .finish()
    }
}
