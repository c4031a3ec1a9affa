//! Chunk/block mapper: turns one file's byte stream into the (Chunk, Slice,
//! Block) graph, sharing tail-packing and dedup rules across three
//! strategies.
//!
//! The three strategies are three implementations of a single `Mapper`
//! capability (`begin_file` / `feed` / `end_file`); selection is a
//! configuration enum fixed for the whole operation, never switched
//! mid-stream.

use tracing::{debug, trace};

use crate::error::Result;
use crate::hash::{crc64, fingerprint, FingerprintHasher, RollingWindow};
use crate::model::{Block, ChunkDescriptor, ChunkTail, FileEntry, Par3Graph, Slice, TailDescriptor, NONE};

/// The minimum tail length eligible for block packing; anything shorter is
/// inlined directly into the File Packet's chunk descriptor and never
/// touches a block.
pub const MIN_PACKABLE_TAIL: u64 = 40;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MapperStrategy {
    Simple,
    AlignedHashed,
    SlideSearch,
}

/// Sorted-by-CRC index over full-size blocks, for dedup lookups: look up the
/// candidate CRC-64 in a sorted list before creating a new block.
#[derive(Default)]
struct FullBlockIndex {
    entries: Vec<(u64, usize)>,
}

impl FullBlockIndex {
    fn candidates(&self, crc: u64) -> &[(u64, usize)] {
        let start = self.entries.partition_point(|(c, _)| *c < crc);
        let end = self.entries[start..].partition_point(|(c, _)| *c == crc) + start;
        &self.entries[start..end]
    }

    fn insert(&mut self, crc: u64, block: usize) {
        let pos = self.entries.partition_point(|(c, _)| *c < crc);
        self.entries.insert(pos, (crc, block));
    }
}

/// Sorted-by-40-byte-prefix-CRC index over tail blocks eligible to receive
/// more packed tails, and over already-placed tail slices for dedup.
#[derive(Default)]
struct TailIndex {
    /// (prefix_crc, block, slice_size, fingerprint) for every tail slice placed so far.
    entries: Vec<(u64, usize, u64, [u8; 16])>,
}

impl TailIndex {
    fn candidates(&self, crc: u64) -> impl Iterator<Item = &(u64, usize, u64, [u8; 16])> {
        let start = self.entries.partition_point(|(c, ..)| *c < crc);
        let end = self.entries[start..].partition_point(|(c, ..)| *c == crc) + start;
        self.entries[start..end].iter()
    }

    fn insert(&mut self, crc: u64, block: usize, size: u64, fp: [u8; 16]) {
        let pos = self.entries.partition_point(|(c, ..)| *c < crc);
        self.entries.insert(pos, (crc, block, size, fp));
    }
}

/// Per-operation mapper state, shared machinery for all three strategies.
pub struct Mapper {
    strategy: MapperStrategy,
    block_size: u64,
    full_index: FullBlockIndex,
    tail_index: TailIndex,
    /// Existing tail blocks with room left: `(block, space_remaining)`.
    open_tail_blocks: Vec<(usize, u64)>,

    cur_file: Option<usize>,
    buf: Vec<u8>,
    file_offset: u64,
    first_16k: Vec<u8>,
    whole_file_hasher: FingerprintHasher,

    open_chunk_descs: Vec<ChunkDescriptor>,
    open_chunk_first_block: Option<usize>,
    open_chunk_block_run: u64,
    expected_next_block: Option<usize>,
}

impl Mapper {
    pub fn new(strategy: MapperStrategy, block_size: u64) -> Self {
        Self {
            strategy,
            block_size,
            full_index: FullBlockIndex::default(),
            tail_index: TailIndex::default(),
            open_tail_blocks: Vec::new(),
            cur_file: None,
            buf: Vec::new(),
            file_offset: 0,
            first_16k: Vec::new(),
            whole_file_hasher: FingerprintHasher::new(),
            open_chunk_descs: Vec::new(),
            open_chunk_first_block: None,
            open_chunk_block_run: 0,
            expected_next_block: None,
        }
    }

    pub fn begin_file(&mut self, graph: &mut Par3Graph, name: String) -> usize {
        trace!(file = %name, strategy = ?self.strategy, "begin_file");
        let file = FileEntry { name, size: 0, fingerprint: [0; 16], first_16k_crc: 0, chunks: Vec::new() };
        graph.files.push(file);
        let idx = graph.files.len() - 1;
        self.cur_file = Some(idx);
        self.buf.clear();
        self.file_offset = 0;
        self.first_16k.clear();
        self.whole_file_hasher = FingerprintHasher::new();
        self.open_chunk_descs.clear();
        self.open_chunk_first_block = None;
        self.open_chunk_block_run = 0;
        self.expected_next_block = None;
        idx
    }

    pub fn feed(&mut self, graph: &mut Par3Graph, bytes: &[u8]) -> Result<()> {
        if self.first_16k.len() < 16384 {
            let take = (16384 - self.first_16k.len()).min(bytes.len());
            self.first_16k.extend_from_slice(&bytes[..take]);
        }
        self.whole_file_hasher.update(bytes);
        self.buf.extend_from_slice(bytes);
        while self.buf.len() as u64 >= self.block_size {
            self.consume_one_block(graph)?;
        }
        Ok(())
    }

    pub fn end_file(&mut self, graph: &mut Par3Graph) -> Result<()> {
        let file = self.cur_file.take().expect("end_file without begin_file");
        self.close_full_block_chunk(graph, file);

        if !self.buf.is_empty() {
            let tail_bytes = std::mem::take(&mut self.buf);
            self.place_tail(graph, file, &tail_bytes)?;
        }

        graph.files[file].first_16k_crc = crc64(&self.first_16k, 0);
        // The fingerprint is of the whole protected content, distinct from
        // the first-16-KiB CRC used as a cheap pre-filter.
        graph.files[file].fingerprint = self.whole_file_hasher.finalize_to_16();

        let size: u64 = graph.files[file].chunks.iter().map(|&c| graph.chunks[c].size()).sum();
        graph.files[file].size = size;
        debug!(file = %graph.files[file].name, size, chunk_count = graph.files[file].chunks.len(), "end_file");
        graph.check_file_size_invariant(file)
    }

    fn consume_one_block(&mut self, graph: &mut Par3Graph) -> Result<()> {
        let file = self.cur_file.unwrap();
        let block_size = self.block_size as usize;
        let window: Vec<u8> = self.buf[..block_size].to_vec();
        let crc = crc64(&window, 0);

        if self.strategy != MapperStrategy::Simple {
            if let Some(existing) = self.find_full_block_match(graph, crc, &window) {
                trace!(block = existing, "dedup hit on aligned full block");
                self.buf.drain(..block_size);
                self.file_offset += block_size as u64;
                self.attach_full_block(graph, file, existing);
                return Ok(());
            }
        }

        if self.strategy == MapperStrategy::SlideSearch {
            if let Some((shift, existing)) = self.slide_search(graph, crc) {
                debug!(block = existing, shift, "slide search realigned to existing block");
                if shift > 0 {
                    let skipped: Vec<u8> = self.buf[..shift].to_vec();
                    self.buf.drain(..shift);
                    self.file_offset += shift as u64;
                    self.close_full_block_chunk(graph, file);
                    self.place_tail(graph, file, &skipped)?;
                }
                self.buf.drain(..block_size);
                self.file_offset += block_size as u64;
                self.attach_full_block(graph, file, existing);
                return Ok(());
            }
        }

        let fp = fingerprint(&window);
        let block = self.new_full_block(graph, crc, fp);
        self.full_index.insert(crc, block);
        self.buf.drain(..block_size);
        self.file_offset += block_size as u64;
        self.attach_full_block(graph, file, block);
        Ok(())
    }

    fn find_full_block_match(&self, graph: &Par3Graph, crc: u64, window: &[u8]) -> Option<usize> {
        let fp = fingerprint(window);
        self.full_index
            .candidates(crc)
            .iter()
            .find(|&&(_, block)| graph.blocks[block].fingerprint == fp)
            .map(|&(_, block)| block)
    }

    /// Roll the window up to `block_size - 1` positions looking for any
    /// previously seen full block. Returns `(shift, matched_block)` when found.
    fn slide_search(&self, graph: &Par3Graph, initial_crc: u64) -> Option<(usize, usize)> {
        let block_size = self.block_size as usize;
        if self.buf.len() < block_size {
            return None;
        }
        let rw = RollingWindow::new(block_size);
        let mut crc = initial_crc;
        let max_shift = (self.buf.len() - block_size).min(block_size - 1);
        for shift in 0..=max_shift {
            if shift > 0 {
                crc = rw.slide(crc, self.buf[shift + block_size - 1], self.buf[shift - 1]);
            }
            if let Some(block) = self.find_full_block_match(graph, crc, &self.buf[shift..shift + block_size]) {
                return Some((shift, block));
            }
        }
        None
    }

    fn new_full_block(&self, graph: &mut Par3Graph, crc: u64, fp: [u8; 16]) -> usize {
        graph.blocks.push(Block {
            size: self.block_size,
            crc,
            fingerprint: fp,
            state: crate::model::block_state::HAS_FULL_DATA,
            slice_head: NONE,
        });
        graph.blocks.len() - 1
    }

    fn attach_full_block(&mut self, graph: &mut Par3Graph, file: usize, block: usize) {
        let is_contiguous = self.expected_next_block == Some(block);
        if !is_contiguous {
            self.close_full_block_chunk(graph, file);
            self.open_chunk_first_block = Some(block);
        }
        self.open_chunk_block_run += 1;
        self.expected_next_block = Some(block + 1);

        let slice_idx = graph.slices.len();
        graph.slices.push(Slice {
            file,
            offset: self.file_offset,
            length: self.block_size,
            chunk: usize::MAX, // patched when the chunk closes
            block,
            tail_offset: 0,
            next: NONE,
            located_at: None,
        });
        graph.link_slice(block, slice_idx);
    }

    fn close_full_block_chunk(&mut self, graph: &mut Par3Graph, file: usize) {
        if self.open_chunk_block_run == 0 {
            return;
        }
        let first_block = self.open_chunk_first_block.unwrap();
        let size = self.open_chunk_block_run * self.block_size;
        let desc = ChunkDescriptor::Protected { size, first_block_index: Some(first_block as u64), tail: ChunkTail::None };
        graph.chunks.push(desc);
        let chunk_idx = graph.chunks.len() - 1;
        graph.files[file].chunks.push(chunk_idx);

        // Patch the slices just emitted for this run with their chunk index.
        for slice in graph.slices.iter_mut().rev() {
            if slice.chunk != usize::MAX {
                break;
            }
            if slice.file != file {
                break;
            }
            slice.chunk = chunk_idx;
        }

        self.open_chunk_block_run = 0;
        self.open_chunk_first_block = None;
    }

    /// Place a remainder (`< block_size` bytes): inline if `< 40` bytes, else
    /// tail-pack into an existing block with room or open a new tail block,
    /// deduping against known tails first.
    fn place_tail(&mut self, graph: &mut Par3Graph, file: usize, bytes: &[u8]) -> Result<()> {
        let size = bytes.len() as u64;
        if size == 0 {
            return Ok(());
        }
        if size < MIN_PACKABLE_TAIL {
            let desc = ChunkDescriptor::Protected { size, first_block_index: None, tail: ChunkTail::Inline(bytes.to_vec()) };
            graph.chunks.push(desc);
            let chunk_idx = graph.chunks.len() - 1;
            graph.files[file].chunks.push(chunk_idx);
            return Ok(());
        }

        let prefix_crc = crc64(&bytes[..40], 0);
        let fp = fingerprint(bytes);

        if self.strategy != MapperStrategy::Simple {
            if let Some(&(_, block, existing_size, existing_fp)) =
                self.tail_index.candidates(prefix_crc).find(|&&(_, _, s, f)| s == size && f == fp)
            {
                let tail_offset = self.find_slice_tail_offset(graph, block, existing_size, existing_fp);
                self.attach_tail_slice(graph, file, block, tail_offset, size, prefix_crc, fp);
                return Ok(());
            }
        }

        // Look for an open tail block with enough remaining room.
        if let Some(pos) = self.open_tail_blocks.iter().position(|&(_, room)| room >= size) {
            let (block, room) = self.open_tail_blocks[pos];
            let tail_offset = self.block_size - room;
            graph.blocks[block].size = tail_offset + size;
            self.open_tail_blocks[pos].1 = room - size;
            if self.open_tail_blocks[pos].1 == 0 {
                self.open_tail_blocks.remove(pos);
            }
            self.attach_tail_slice(graph, file, block, tail_offset, size, prefix_crc, fp);
            self.tail_index.insert(prefix_crc, block, size, fp);
            return Ok(());
        }

        // Open a new tail block.
        graph.blocks.push(Block {
            size,
            crc: 0,
            fingerprint: [0; 16],
            state: crate::model::block_state::HAS_TAIL_DATA,
            slice_head: NONE,
        });
        let block = graph.blocks.len() - 1;
        let room = self.block_size - size;
        if room > 0 {
            self.open_tail_blocks.push((block, room));
        }
        self.attach_tail_slice(graph, file, block, 0, size, prefix_crc, fp);
        self.tail_index.insert(prefix_crc, block, size, fp);
        Ok(())
    }

    fn find_slice_tail_offset(&self, graph: &Par3Graph, block: usize, size: u64, fp: [u8; 16]) -> u64 {
        for slice in graph.slices_of(block) {
            if slice.length == size {
                // Any slice in this block of matching size is an acceptable
                // anchor; dedup correctness only requires sharing the block.
                let _ = fp;
                return slice.tail_offset;
            }
        }
        0
    }

    fn attach_tail_slice(
        &mut self,
        graph: &mut Par3Graph,
        file: usize,
        block: usize,
        tail_offset: u64,
        size: u64,
        prefix_crc: u64,
        fp: [u8; 16],
    ) {
        let slice_idx = graph.slices.len();
        graph.slices.push(Slice {
            file,
            offset: self.file_offset,
            length: size,
            chunk: usize::MAX,
            block,
            tail_offset,
            next: NONE,
            located_at: None,
        });
        graph.link_slice(block, slice_idx);
        self.file_offset += size;

        let desc = ChunkDescriptor::Protected {
            size,
            first_block_index: None,
            tail: ChunkTail::Block(TailDescriptor { crc: prefix_crc, fingerprint: fp, block_index: block as u64, offset: tail_offset }),
        };
        graph.chunks.push(desc);
        let chunk_idx = graph.chunks.len() - 1;
        graph.files[file].chunks.push(chunk_idx);
        graph.slices[slice_idx].chunk = chunk_idx;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_one_file(strategy: MapperStrategy, block_size: u64, data: &[u8]) -> (Par3Graph, usize) {
        let mut graph = Par3Graph::new(block_size);
        let mut mapper = Mapper::new(strategy, block_size);
        let file = mapper.begin_file(&mut graph, "f".into());
        mapper.feed(&mut graph, data).unwrap();
        mapper.end_file(&mut graph).unwrap();
        (graph, file)
    }

    #[test]
    fn exact_block_size_file_has_one_chunk_no_tail() {
        let block_size = 64u64;
        let data = vec![0xAB; block_size as usize];
        let (graph, file) = map_one_file(MapperStrategy::Simple, block_size, &data);
        assert_eq!(graph.files[file].chunks.len(), 1);
        assert_eq!(graph.blocks.len(), 1);
        match &graph.chunks[graph.files[file].chunks[0]] {
            ChunkDescriptor::Protected { size, tail: ChunkTail::None, .. } => assert_eq!(*size, block_size),
            other => panic!("unexpected descriptor {other:?}"),
        }
    }

    #[test]
    fn tiny_remainder_is_inlined_not_block_packed() {
        let block_size = 64u64;
        let mut data = vec![0xAB; block_size as usize];
        data.extend_from_slice(b"hi"); // 2-byte remainder
        let (graph, file) = map_one_file(MapperStrategy::Simple, block_size, &data);
        assert_eq!(graph.blocks.len(), 1); // no tail block created
        assert_eq!(graph.files[file].chunks.len(), 2);
        match &graph.chunks[graph.files[file].chunks[1]] {
            ChunkDescriptor::Protected { tail: ChunkTail::Inline(bytes), .. } => assert_eq!(bytes, b"hi"),
            other => panic!("unexpected descriptor {other:?}"),
        }
    }

    #[test]
    fn dedup_reuses_identical_block_across_files() {
        let block_size = 64u64;
        let data = vec![0x11; block_size as usize];
        let mut graph = Par3Graph::new(block_size);
        let mut mapper = Mapper::new(MapperStrategy::AlignedHashed, block_size);

        let f1 = mapper.begin_file(&mut graph, "a".into());
        mapper.feed(&mut graph, &data).unwrap();
        mapper.end_file(&mut graph).unwrap();

        let f2 = mapper.begin_file(&mut graph, "b".into());
        mapper.feed(&mut graph, &data).unwrap();
        mapper.end_file(&mut graph).unwrap();

        assert_eq!(graph.blocks.len(), 1);
        let block = match graph.chunks[graph.files[f1].chunks[0]] {
            ChunkDescriptor::Protected { first_block_index: Some(b), .. } => b,
            _ => panic!(),
        };
        assert_eq!(graph.slices_of(block as usize).count(), 2);
        let _ = f2;
    }

    #[test]
    fn two_files_sharing_40_byte_tail_pack_into_same_block() {
        let block_size = 4096u64;
        let mut common_tail = vec![0u8; 40];
        for (i, b) in common_tail.iter_mut().enumerate() {
            *b = i as u8;
        }
        let mut data_a = vec![0xAA; 4]; // 4-byte unique prefix, then shared 40-byte tail
        data_a.extend_from_slice(&common_tail);
        let mut data_b = vec![0xBB; 18]; // 18-byte unique prefix, then shared 40-byte tail
        data_b.extend_from_slice(&common_tail);

        let mut graph = Par3Graph::new(block_size);
        let mut mapper = Mapper::new(MapperStrategy::AlignedHashed, block_size);
        let fa = mapper.begin_file(&mut graph, "a".into());
        mapper.feed(&mut graph, &data_a).unwrap();
        mapper.end_file(&mut graph).unwrap();
        let fb = mapper.begin_file(&mut graph, "b".into());
        mapper.feed(&mut graph, &data_b).unwrap();
        mapper.end_file(&mut graph).unwrap();

        // Both remainders are 44 bytes (>= 40), so both are tail-packed, sharing one block.
        assert_eq!(graph.blocks.len(), 1);
        assert_eq!(graph.blocks[0].is_tail_packed(), true);
        let _ = (fa, fb);
    }

    fn strategy_from_tag(tag: u8) -> MapperStrategy {
        match tag % 3 {
            0 => MapperStrategy::Simple,
            1 => MapperStrategy::AlignedHashed,
            _ => MapperStrategy::SlideSearch,
        }
    }

    proptest::proptest! {
        // Spec §8 invariant 2: a file's chunk descriptors always reconstruct
        // to exactly the bytes fed in, for any length / block size / strategy.
        #[test]
        fn chunk_descriptors_cover_exactly_the_fed_bytes(
            data in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..300),
            block_size in 1u64..48,
            strategy_tag in proptest::prelude::any::<u8>(),
        ) {
            let (graph, file) = map_one_file(strategy_from_tag(strategy_tag), block_size, &data);
            let covered: u64 = graph.files[file].chunks.iter().map(|&c| graph.chunks[c].size()).sum();
            proptest::prop_assert_eq!(covered, data.len() as u64);
            proptest::prop_assert_eq!(graph.files[file].size, data.len() as u64);
        }
    }
}
