//! Block-backed resizable byte container (§4.4).

use parking_lot::RwLock;

/// Default block size; overridable per filesystem via
/// `MemFsConfig::block_size`.
pub const DEFAULT_BLOCK_SIZE: usize = 8192;

struct Blocks {
    block_size: usize,
    blocks: Vec<Box<[u8]>>,
    size: usize,
}

impl Blocks {
    fn capacity(&self) -> usize {
        self.blocks.len() * self.block_size
    }

    /// Grows the block list by doubling until it can hold `needed` bytes.
    /// Newly allocated blocks are zero-initialized, which is what makes
    /// holes (writes past the old size) read back as zero.
    fn ensure_capacity(&mut self, needed: usize) {
        if needed <= self.capacity() {
            return;
        }
        let needed_blocks = needed.div_ceil(self.block_size);
        let mut target = self.blocks.len().max(1);
        while target < needed_blocks {
            target *= 2;
        }
        self.blocks
            .resize_with(target, || vec![0u8; self.block_size].into_boxed_slice());
    }

    fn read_at(&self, pos: usize, dst: &mut [u8]) -> usize {
        if pos >= self.size || dst.is_empty() {
            return 0;
        }
        let end = (pos + dst.len()).min(self.size);
        let mut p = pos;
        let mut written = 0;
        while p < end {
            let block_idx = p / self.block_size;
            let block_off = p % self.block_size;
            let take = (self.block_size - block_off).min(end - p);
            match self.blocks.get(block_idx) {
                Some(block) => dst[written..written + take]
                    .copy_from_slice(&block[block_off..block_off + take]),
                None => dst[written..written + take].fill(0),
            }
            written += take;
            p += take;
        }
        written
    }

    fn write_at(&mut self, pos: usize, src: &[u8]) -> usize {
        if src.is_empty() {
            return 0;
        }
        let end = pos + src.len();
        self.ensure_capacity(end);
        let mut p = pos;
        let mut read = 0;
        while p < end {
            let block_idx = p / self.block_size;
            let block_off = p % self.block_size;
            let take = (self.block_size - block_off).min(end - p);
            self.blocks[block_idx][block_off..block_off + take]
                .copy_from_slice(&src[read..read + take]);
            p += take;
            read += take;
        }
        if end > self.size {
            self.size = end;
        }
        src.len()
    }
}

/// The content of a regular-file inode. Reads take the shared lock, writes
/// (including `append`/`truncate`/`transfer_from`) take the exclusive lock;
/// `transfer_to` re-acquires the shared lock per chunk so a long transfer
/// does not starve writers (§4.4).
pub struct ByteStore {
    inner: RwLock<Blocks>,
}

impl ByteStore {
    pub fn new(block_size: usize) -> Self {
        Self {
            inner: RwLock::new(Blocks {
                block_size: block_size.max(1),
                blocks: Vec::new(),
                size: 0,
            }),
        }
    }

    pub fn size(&self) -> usize {
        self.inner.read().size
    }

    pub fn read(&self, pos: usize, dst: &mut [u8]) -> usize {
        self.inner.read().read_at(pos, dst)
    }

    pub fn write(&self, pos: usize, src: &[u8]) -> usize {
        self.inner.write().write_at(pos, src)
    }

    /// Writes at the current size and returns `(offset_written_at, len)`.
    pub fn append(&self, src: &[u8]) -> (usize, usize) {
        let mut guard = self.inner.write();
        let pos = guard.size;
        let n = guard.write_at(pos, src);
        (pos, n)
    }

    /// Shrinks to `n`; per §4.4 this never extends the store, only a
    /// subsequent write does.
    pub fn truncate(&self, n: usize) {
        let mut guard = self.inner.write();
        if n < guard.size {
            guard.size = n;
            let needed_blocks = n.div_ceil(guard.block_size);
            guard.blocks.truncate(needed_blocks);
        }
    }

    pub fn copy(&self) -> ByteStore {
        let guard = self.inner.read();
        ByteStore {
            inner: RwLock::new(Blocks {
                block_size: guard.block_size,
                blocks: guard.blocks.clone(),
                size: guard.size,
            }),
        }
    }

    pub fn transfer_from<R: std::io::Read>(
        &self,
        reader: &mut R,
        pos: usize,
    ) -> std::io::Result<usize> {
        let mut buf = vec![0u8; 64 * 1024];
        let mut offset = pos;
        let mut total = 0;
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            self.write(offset, &buf[..n]);
            offset += n;
            total += n;
        }
        Ok(total)
    }

    /// Releases the read lock between chunks so a long transfer cannot
    /// starve writers; each chunk observes a consistent prefix, but the
    /// transfer as a whole is not atomic (§4.4).
    pub fn transfer_to<W: std::io::Write>(
        &self,
        pos: usize,
        len: usize,
        writer: &mut W,
    ) -> std::io::Result<usize> {
        const CHUNK: usize = 64 * 1024;
        let mut remaining = len;
        let mut offset = pos;
        let mut total = 0;
        let mut buf = vec![0u8; CHUNK.min(len.max(1))];
        while remaining > 0 {
            let take = remaining.min(buf.len());
            let n = self.read(offset, &mut buf[..take]);
            if n == 0 {
                break;
            }
            writer.write_all(&buf[..n])?;
            offset += n;
            remaining -= n;
            total += n;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_exact_bytes() {
        let store = ByteStore::new(16);
        store.write(0, b"hello");
        let mut buf = [0u8; 5];
        assert_eq!(store.read(0, &mut buf), 5);
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn forward_jump_write_leaves_a_zero_hole() {
        let store = ByteStore::new(16);
        store.write(0, b"ab");
        store.write(10, b"z");
        let mut hole = [0xffu8; 8];
        let n = store.read(2, &mut hole);
        assert_eq!(n, 8);
        assert_eq!(hole, [0u8; 8]);
        assert_eq!(store.size(), 11);
    }

    #[test]
    fn append_places_bytes_at_current_size() {
        let store = ByteStore::new(4);
        store.write(0, &[1, 2, 3]);
        store.append(&[4, 5]);
        let mut buf = [0u8; 5];
        store.read(0, &mut buf);
        assert_eq!(buf, [1, 2, 3, 4, 5]);
        assert_eq!(store.size(), 5);
    }

    #[test]
    fn truncate_shrinks_but_never_extends() {
        let store = ByteStore::new(8);
        store.write(0, b"abcdef");
        store.truncate(3);
        assert_eq!(store.size(), 3);
        store.truncate(100);
        assert_eq!(store.size(), 3);
    }

    #[test]
    fn copy_is_independent_of_the_original() {
        let store = ByteStore::new(8);
        store.write(0, b"abc");
        let clone = store.copy();
        store.write(0, b"xyz");
        let mut buf = [0u8; 3];
        clone.read(0, &mut buf);
        assert_eq!(&buf, b"abc");
    }

    #[test]
    fn transfer_round_trips_through_a_cursor() {
        let store = ByteStore::new(8);
        store.write(0, b"0123456789");
        let mut sink = Vec::new();
        store.transfer_to(2, 5, &mut sink).unwrap();
        assert_eq!(sink, b"23456");

        let other = ByteStore::new(8);
        let mut cursor = std::io::Cursor::new(sink);
        other.transfer_from(&mut cursor, 0).unwrap();
        let mut buf = [0u8; 5];
        other.read(0, &mut buf);
        assert_eq!(&buf, b"23456");
    }
}
