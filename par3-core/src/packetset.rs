//! Packet-set manager: collect packets scattered across many files, dedup by
//! fingerprint, resolve the effective InputSetID through the parent-chain,
//! prune foreign sets, and rehydrate the (Chunk, Slice, Block, File,
//! Directory) graph from the surviving File/Directory/Root packets.
//!
//! Grounded in `original_source/windows/src/libpar3.c`'s packet-list
//! bookkeeping and `windows/src/map.c`'s packet-to-graph reconstruction,
//! generalized to operate on in-memory byte buffers rather than open file
//! handles (the core's only I/O boundary is `packet::IncrementalReader`).

use std::collections::{HashMap, HashSet};

use crate::error::{Par3Error, Result};
use crate::hash::fingerprint;
use crate::model::{
    Block, ChunkDescriptor, ChunkTail, DirectoryEntry, FileEntry, Par3Graph, Slice, TailDescriptor, NONE,
};
use crate::packet::{
    read_packet, DirectoryBody, ExternalDataBody, FileBody, Packet, PacketBody, RootBody, StartBody,
};

/// Every packet seen so far, deduplicated by its own fingerprint: collects
/// every packet found across every supplied PAR file into typed arrays.
#[derive(Default)]
pub struct PacketStore {
    packets: HashMap<[u8; 16], Packet>,
}

impl PacketStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan `bytes` (the full contents of one PAR file) for packets,
    /// tolerating arbitrary interleaved garbage and a straddling final
    /// header, and merge any new ones in by fingerprint.
    pub fn scan(&mut self, bytes: &[u8], block_size_hint: u64) {
        let mut pos = 0usize;
        while pos < bytes.len() {
            match read_packet(&bytes[pos..], block_size_hint) {
                Ok((packet, consumed)) => {
                    self.packets.entry(packet.header.fingerprint).or_insert(packet);
                    pos += consumed;
                }
                Err(_) => pos += 1,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    fn of_set(&self, set_id: u64) -> impl Iterator<Item = &Packet> {
        self.packets.values().filter(move |p| p.header.input_set_id == set_id)
    }

    fn starts(&self) -> impl Iterator<Item = (u64, &StartBody)> {
        self.packets.values().filter_map(|p| match &p.body {
            PacketBody::Start(s) => Some((p.header.input_set_id, s)),
            _ => None,
        })
    }

    /// Every Recovery Packet's payload, keyed by its recovery block index.
    pub fn recovery_payloads(&self) -> impl Iterator<Item = (u64, Vec<u8>)> + '_ {
        self.packets.values().filter_map(|p| match &p.body {
            PacketBody::Recovery(r) => Some((r.recovery_block_index, r.payload.clone())),
            _ => None,
        })
    }

    /// The total recovery-block count the creator declared for `effective`,
    /// if its Cauchy Packet carries one. The Cauchy Packet's `row_hints` is
    /// otherwise free-form (spec leaves its exact contents to the
    /// implementation); this store puts the 8-byte LE recovery-block count
    /// up front so Galois field width selection stays consistent between
    /// creation and repair even when not every recovery volume survived.
    pub fn total_recovery_block_count(&self, effective: u64) -> Option<u64> {
        self.of_set(effective).find_map(|p| match &p.body {
            PacketBody::Cauchy(c) if c.row_hints.len() >= 8 => {
                Some(u64::from_le_bytes(c.row_hints[0..8].try_into().unwrap()))
            }
            _ => None,
        })
    }

    /// Remove every packet whose InputSetID is outside `keep`; the Root
    /// Packet is further restricted to `effective` alone.
    pub fn prune(&mut self, effective: u64, keep: &HashSet<u64>) {
        self.packets.retain(|_, p| {
            if !keep.contains(&p.header.input_set_id) {
                return false;
            }
            if matches!(p.body, PacketBody::Root(_)) && p.header.input_set_id != effective {
                return false;
            }
            true
        });
    }
}

/// Determine which InputSetID is authoritative.
///
/// Returns `(effective_set_id, ancestor_set_ids)`. When multiple root chains
/// are present (an Open Question the source leaves unresolved — see
/// `DESIGN.md`), the chain whose root has the numerically smallest SetID is
/// followed, and at each branch point the numerically smallest child is
/// preferred, for a deterministic result.
pub fn resolve_effective_set(store: &PacketStore) -> Result<(u64, HashSet<u64>)> {
    let starts: Vec<(u64, StartBody)> = store.starts().map(|(id, s)| (id, s.clone())).collect();
    if starts.is_empty() {
        return Err(Par3Error::insufficient("no Start Packet recovered"));
    }
    if starts.len() == 1 {
        return Ok((starts[0].0, HashSet::new()));
    }

    let mut children: HashMap<u64, Vec<u64>> = HashMap::new();
    let mut roots: Vec<u64> = Vec::new();
    for (id, body) in &starts {
        if body.parent_set_id == 0 {
            roots.push(*id);
        } else {
            children.entry(body.parent_set_id).or_default().push(*id);
        }
    }
    roots.sort_unstable();
    let Some(&root) = roots.first() else {
        return Err(Par3Error::insufficient("Start Packet chain has no root (parent_set_id == 0)"));
    };

    let mut ancestors = HashSet::new();
    let mut current = root;
    loop {
        let mut kids = children.remove(&current).unwrap_or_default();
        if kids.is_empty() {
            break;
        }
        kids.sort_unstable();
        ancestors.insert(current);
        current = kids[0];
    }
    Ok((current, ancestors))
}

/// Rehydrate the (File, Directory, Chunk, Slice, Block) graph from the
/// surviving packets of `effective` (plus its ancestors, for data shared
/// across an incremental-backup chain), reversing the mapper's emission
/// rules.
pub fn materialize(store: &PacketStore, effective: u64, ancestors: &HashSet<u64>) -> Result<Par3Graph> {
    let start = store
        .of_set(effective)
        .find_map(|p| match &p.body {
            PacketBody::Start(s) => Some(s.clone()),
            _ => None,
        })
        .ok_or_else(|| Par3Error::insufficient("no Start Packet for the effective set"))?;

    let root_body = store
        .of_set(effective)
        .find_map(|p| match &p.body {
            PacketBody::Root(r) => Some(r.clone()),
            _ => None,
        })
        .ok_or_else(|| Par3Error::insufficient("no Root Packet for the effective set"))?;

    let mut graph = Par3Graph::new(start.block_size);
    graph.blocks = vec![Block::empty(); root_body.next_free_block_index as usize];

    // Collect every File/Directory packet belonging to the effective set or
    // one of its ancestors, indexed by the packet's own fingerprint so
    // Root/Directory child lists (which reference fingerprints) can resolve.
    let mut file_bodies: HashMap<[u8; 16], FileBody> = HashMap::new();
    let mut dir_bodies: HashMap<[u8; 16], DirectoryBody> = HashMap::new();
    for set_id in ancestors.iter().copied().chain(std::iter::once(effective)) {
        for p in store.of_set(set_id) {
            match &p.body {
                PacketBody::File(f) => {
                    file_bodies.insert(p.header.fingerprint, f.clone());
                }
                PacketBody::Directory(d) => {
                    dir_bodies.insert(p.header.fingerprint, d.clone());
                }
                _ => {}
            }
        }
    }

    // Apply External Data Packets: authoritative crc/fingerprint for runs of
    // full-size blocks, independent of which file references them.
    for p in store.of_set(effective) {
        if let PacketBody::ExternalData(e) = &p.body {
            apply_external_data(&mut graph, e);
        }
    }

    // First pass: materialize every File/Directory packet into the graph,
    // recording its packet fingerprint -> graph index so the second pass can
    // resolve Root/Directory child lists.
    let mut file_index: HashMap<[u8; 16], usize> = HashMap::new();
    let mut dir_index: HashMap<[u8; 16], usize> = HashMap::new();
    for (fp, body) in &file_bodies {
        let idx = materialize_file(&mut graph, body)?;
        file_index.insert(*fp, idx);
    }
    for fp in dir_bodies.keys() {
        graph.directories.push(DirectoryEntry { name: String::new(), files: Vec::new(), subdirs: Vec::new() });
        dir_index.insert(*fp, graph.directories.len() - 1);
    }
    for (fp, body) in &dir_bodies {
        let idx = dir_index[fp];
        graph.directories[idx].name = body.name.clone();
        for child_fp in &body.children {
            if let Some(&fi) = file_index.get(child_fp) {
                graph.directories[idx].files.push(fi);
            } else if let Some(&di) = dir_index.get(child_fp) {
                graph.directories[idx].subdirs.push(di);
            }
        }
    }

    // The Root Packet is itself a directory-shaped node: a root marker whose
    // children are the top-level files/directories of the set's logical root.
    graph.directories.push(DirectoryEntry { name: String::new(), files: Vec::new(), subdirs: Vec::new() });
    let root_dir = graph.directories.len() - 1;
    for child_fp in &root_body.children {
        if let Some(&fi) = file_index.get(child_fp) {
            graph.directories[root_dir].files.push(fi);
        } else if let Some(&di) = dir_index.get(child_fp) {
            graph.directories[root_dir].subdirs.push(di);
        }
    }
    graph.root = Some(root_dir);

    Ok(graph)
}

fn apply_external_data(graph: &mut Par3Graph, e: &ExternalDataBody) {
    for (i, (crc, fp)) in e.checksums.iter().enumerate() {
        let block = e.first_block_index as usize + i;
        if block >= graph.blocks.len() {
            break;
        }
        graph.blocks[block].crc = *crc;
        graph.blocks[block].fingerprint = *fp;
        graph.blocks[block].state |= crate::model::block_state::HAS_FULL_DATA | crate::model::block_state::CHECKSUM_KNOWN;
    }
}

fn materialize_file(graph: &mut Par3Graph, body: &FileBody) -> Result<usize> {
    let file_idx = graph.files.len();
    let mut chunk_indices = Vec::with_capacity(body.chunks.len());
    let mut file_offset = 0u64;

    for desc in &body.chunks {
        graph.chunks.push(desc.clone());
        let chunk_idx = graph.chunks.len() - 1;
        chunk_indices.push(chunk_idx);

        match desc {
            ChunkDescriptor::Unprotected { span } => {
                file_offset += span;
            }
            ChunkDescriptor::Protected { size, first_block_index, tail } => {
                let mut remaining = *size;
                if let Some(first_block) = first_block_index {
                    let block_size = graph.block_size;
                    let mut block = *first_block as usize;
                    while remaining >= block_size && block_size > 0 {
                        ensure_block(graph, block);
                        graph.blocks[block].state |= crate::model::block_state::HAS_FULL_DATA;
                        graph.blocks[block].size = block_size;
                        push_slice(graph, file_idx, file_offset, block_size, chunk_idx, block, 0);
                        file_offset += block_size;
                        remaining -= block_size;
                        block += 1;
                    }
                }
                match tail {
                    ChunkTail::None => {}
                    ChunkTail::Inline(bytes) => {
                        file_offset += bytes.len() as u64;
                    }
                    ChunkTail::Block(TailDescriptor { crc, fingerprint: fp, block_index, offset }) => {
                        let block = *block_index as usize;
                        ensure_block(graph, block);
                        graph.blocks[block].state |= crate::model::block_state::HAS_TAIL_DATA;
                        graph.blocks[block].size = graph.blocks[block].size.max(offset + remaining);
                        if graph.blocks[block].crc == 0 && graph.blocks[block].fingerprint == [0; 16] {
                            graph.blocks[block].crc = *crc;
                            graph.blocks[block].fingerprint = *fp;
                        }
                        push_slice(graph, file_idx, file_offset, remaining, chunk_idx, block, *offset);
                        file_offset += remaining;
                    }
                }
            }
        }
    }

    let size: u64 = body.chunks.iter().map(|c| c.size()).sum();
    graph.files.push(FileEntry {
        name: body.name.clone(),
        size,
        fingerprint: body.fingerprint,
        first_16k_crc: body.first_16k_crc,
        chunks: chunk_indices,
    });
    Ok(file_idx)
}

fn ensure_block(graph: &mut Par3Graph, block: usize) {
    if block >= graph.blocks.len() {
        graph.blocks.resize(block + 1, Block::empty());
    }
}

fn push_slice(
    graph: &mut Par3Graph,
    file: usize,
    offset: u64,
    length: u64,
    chunk: usize,
    block: usize,
    tail_offset: u64,
) {
    let slice_idx = graph.slices.len();
    graph.slices.push(Slice { file, offset, length, chunk, block, tail_offset, next: NONE, located_at: None });
    graph.link_slice(block, slice_idx);
}

/// Convenience: scan one packet back out of the store by its own body
/// (re-serialize and refingerprint), used by callers that built a Start or
/// Root packet in memory and want its fingerprint without a round trip
/// through bytes.
pub fn packet_fingerprint(input_set_id: u64, body: &PacketBody) -> [u8; 16] {
    let bytes = crate::packet::write_packet(input_set_id, body);
    fingerprint(&bytes[24..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ChunkTail;
    use crate::packet::{write_packet, RootBody};

    fn start_packet(set_id: u64, parent: u64) -> Packet {
        let body = PacketBody::Start(StartBody {
            parent_set_id: parent,
            parent_root_fp: [0; 16],
            block_size: 64,
            galois_width: 1,
            generator: vec![0x1D],
        });
        let bytes = write_packet(set_id, &body);
        read_packet(&bytes, 64).unwrap().0
    }

    #[test]
    fn single_start_packet_is_trivially_effective() {
        let mut store = PacketStore::new();
        let bytes = write_packet(99, &PacketBody::Start(StartBody {
            parent_set_id: 0,
            parent_root_fp: [0; 16],
            block_size: 4096,
            galois_width: 1,
            generator: vec![0x1D],
        }));
        store.scan(&bytes, 4096);
        let (effective, ancestors) = resolve_effective_set(&store).unwrap();
        assert_eq!(effective, 99);
        assert!(ancestors.is_empty());
    }

    #[test]
    fn chain_resolves_to_last_descendant() {
        let mut store = PacketStore::new();
        for p in [start_packet(1, 0), start_packet(2, 1), start_packet(3, 2)] {
            let bytes = write_packet(p.header.input_set_id, &p.body);
            store.scan(&bytes, 64);
        }
        let (effective, ancestors) = resolve_effective_set(&store).unwrap();
        assert_eq!(effective, 3);
        assert_eq!(ancestors, HashSet::from([1, 2]));
    }

    #[test]
    fn missing_start_packet_is_insufficient_metadata() {
        let store = PacketStore::new();
        assert!(resolve_effective_set(&store).is_err());
    }

    #[test]
    fn materialize_rebuilds_file_with_full_block_and_tail() {
        let set_id = 7u64;
        let block_size = 64u64;
        let mut store = PacketStore::new();

        let start = PacketBody::Start(StartBody {
            parent_set_id: 0,
            parent_root_fp: [0; 16],
            block_size,
            galois_width: 1,
            generator: vec![0x1D],
        });
        store.scan(&write_packet(set_id, &start), block_size);

        let chunks = vec![
            ChunkDescriptor::Protected { size: block_size, first_block_index: Some(0), tail: ChunkTail::None },
            ChunkDescriptor::Protected {
                size: 44,
                first_block_index: None,
                tail: ChunkTail::Block(TailDescriptor { crc: 0xAB, fingerprint: [3; 16], block_index: 1, offset: 0 }),
            },
        ];
        let file_body = FileBody {
            name: "f.bin".into(),
            first_16k_crc: 0x99,
            fingerprint: [1; 16],
            options: vec![],
            chunks,
        };
        let file_packet_bytes = write_packet(set_id, &PacketBody::File(file_body));
        store.scan(&file_packet_bytes, block_size);
        let file_fp = read_packet(&file_packet_bytes, block_size).unwrap().0.header.fingerprint;

        let root = PacketBody::Root(RootBody {
            next_free_block_index: 2,
            attributes: 0,
            options: vec![],
            children: vec![file_fp],
        });
        store.scan(&write_packet(set_id, &root), block_size);

        let (effective, ancestors) = resolve_effective_set(&store).unwrap();
        let graph = materialize(&store, effective, &ancestors).unwrap();

        assert_eq!(graph.files.len(), 1);
        assert_eq!(graph.blocks.len(), 2);
        assert!(graph.blocks[0].is_full());
        assert!(graph.blocks[1].is_tail_packed());
        assert_eq!(graph.slices.len(), 2);
    }
}
