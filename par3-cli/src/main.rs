//! `par3` command-line interface: `create` / `verify` / `repair` / `list`
//! subcommands over `par3-core`. A thin `main()` -> subcommand-function ->
//! `anyhow::Result` shape, directory discovery via `walkdir` + `globset`, and
//! terminal reporting via plain `println!` -- all the I/O and host-filesystem
//! concerns the core itself stays ignorant of. Diagnostic detail (field
//! width selection, slide-search fallbacks, repair matrix sizing) goes
//! through `tracing` instead, visible under `RUST_LOG`.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use par3_core::chunkmap::{Mapper, MapperStrategy};
use par3_core::container::{self, SizingScheme};
use par3_core::error::{Par3Error, ReturnCode};
use par3_core::galois::GaloisWidth;
use par3_core::hash::FingerprintHasher;
use par3_core::model::Par3Graph;
use par3_core::packet::{
    write_packet, CauchyBody, DirectoryBody, FileBody, PacketBody, RecoveryBody, RootBody, StartBody,
};
use par3_core::packetset::{self, PacketStore};
use par3_core::path_safety::{validate_path, PathPolicy};
use par3_core::repair;
use par3_core::rs::{self, Region};
use par3_core::search::{self, KnownFile, SearchBudget, Searcher};
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Strategy {
    Simple,
    Hashed,
    Slide,
}

impl From<Strategy> for MapperStrategy {
    fn from(s: Strategy) -> Self {
        match s {
            Strategy::Simple => MapperStrategy::Simple,
            Strategy::Hashed => MapperStrategy::AlignedHashed,
            Strategy::Slide => MapperStrategy::SlideSearch,
        }
    }
}

#[derive(Parser)]
#[command(name = "par3", version, about = "PAR3 erasure-coded archive toolkit")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Create a PAR3 set for one or more files/directories.
    Create {
        #[arg(long, default_value_t = 4096)]
        block_size: u64,
        #[arg(long, default_value_t = 8)]
        recovery_blocks: u64,
        #[arg(long, value_enum, default_value_t = Strategy::Hashed)]
        strategy: Strategy,
        #[arg(long, default_value_t = 1)]
        files: u64,
        /// Base name for the produced `.par3` / `.vol*+*.par3` files.
        #[arg(long)]
        output: PathBuf,
        #[arg(long)]
        include: Vec<String>,
        #[arg(long)]
        exclude: Vec<String>,
        inputs: Vec<PathBuf>,
    },
    /// Scan PAR files and report which blocks/files are intact.
    Verify {
        /// The index file, plus any archive/recovery volumes to scan.
        par_files: Vec<PathBuf>,
        /// Directory the protected files live in.
        #[arg(long, default_value = ".")]
        root: PathBuf,
    },
    /// Verify, then reconstruct any damaged/missing files possible.
    Repair {
        par_files: Vec<PathBuf>,
        #[arg(long, default_value = ".")]
        root: PathBuf,
    },
    /// List the files a PAR3 set describes.
    List { par_files: Vec<PathBuf> },
}

fn main() {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("par3: {e:#}");
            match e.downcast_ref::<Par3Error>() {
                Some(pe) => ReturnCode::from_error(pe),
                None => ReturnCode::IoError,
            }
        }
    };
    std::process::exit(code.code());
}

fn run(cli: Cli) -> Result<ReturnCode> {
    match cli.cmd {
        Cmd::Create { block_size, recovery_blocks, strategy, files, output, include, exclude, inputs } => {
            create(block_size, recovery_blocks, strategy.into(), files, &output, &include, &exclude, &inputs)
        }
        Cmd::Verify { par_files, root } => verify(&par_files, &root),
        Cmd::Repair { par_files, root } => repair_cmd(&par_files, &root),
        Cmd::List { par_files } => list(&par_files),
    }
}

fn build_globset(includes: &[String], excludes: &[String]) -> Result<(GlobSet, GlobSet)> {
    let mut incb = GlobSetBuilder::new();
    let mut excb = GlobSetBuilder::new();
    if includes.is_empty() {
        incb.add(Glob::new("**/*")?);
    }
    for g in includes {
        incb.add(Glob::new(g)?);
    }
    for g in excludes {
        excb.add(Glob::new(g)?);
    }
    Ok((incb.build()?, excb.build()?))
}

/// Recursively discover files under `inputs`, relative-pathed for storage in
/// File Packets. Directory inputs are named relative to the directory itself
/// (not the process cwd), since `verify`/`repair`'s `--root` is that same
/// directory when repair time comes — storing the directory's own name in
/// every entry would make `root.join(name)` double up the prefix.
fn list_files(inputs: &[PathBuf], inc: &GlobSet, exc: &GlobSet) -> Result<Vec<(String, PathBuf)>> {
    let cwd = std::env::current_dir()?;
    let mut out = Vec::new();
    for p in inputs {
        let md = fs::metadata(p).with_context(|| format!("stat {}", p.display()))?;
        if md.is_dir() {
            for entry in WalkDir::new(p).into_iter().filter_map(|e| e.ok()) {
                if !entry.file_type().is_file() {
                    continue;
                }
                let path = entry.path();
                let rel = pathdiff::diff_paths(path, p).unwrap_or_else(|| path.to_path_buf());
                let rel_str = rel.to_string_lossy().replace('\\', "/");
                if inc.is_match(&rel_str) && !exc.is_match(&rel_str) {
                    out.push((rel_str, path.to_path_buf()));
                }
            }
        } else {
            let rel = pathdiff::diff_paths(p, &cwd).unwrap_or_else(|| p.clone());
            out.push((rel.to_string_lossy().replace('\\', "/"), p.clone()));
        }
    }
    out.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(out)
}

/// Build one Directory Packet per directory that appears in `files`'
/// relative paths, deepest first, then return `(packet_bytes, root_children)`
/// where `root_children` are the fingerprints of the top-level entries
/// (files and directories with no parent directory of their own).
fn build_directory_packets(
    input_set_id: u64,
    files: &[(String, PathBuf)],
    file_fingerprint_by_rel: &HashMap<String, [u8; 16]>,
) -> (Vec<Vec<u8>>, Vec<[u8; 16]>) {
    // `child_files[dir]` / `child_dirs[dir]` hold direct children only;
    // `""` is the logical root. Every ancestor directory of every file gets
    // an entry, even if it holds only subdirectories.
    let mut child_files: HashMap<String, Vec<String>> = HashMap::new();
    let mut child_dirs: HashMap<String, Vec<String>> = HashMap::new();
    let mut all_dirs: Vec<String> = Vec::new();

    for (rel, _) in files {
        let mut components: Vec<&str> = rel.split('/').collect();
        let file_component = components.pop().unwrap_or(rel.as_str());
        let mut dir_path = String::new();
        for comp in &components {
            let prev = dir_path.clone();
            if dir_path.is_empty() {
                dir_path = (*comp).to_string();
            } else {
                dir_path.push('/');
                dir_path.push_str(comp);
            }
            if !all_dirs.contains(&dir_path) {
                all_dirs.push(dir_path.clone());
            }
            child_dirs.entry(prev).or_default().push(dir_path.clone());
        }
        let owner = if components.is_empty() { String::new() } else { dir_path };
        child_files.entry(owner).or_default().push(file_component.to_string());
    }

    // De-dup parent->child links (a directory can be reached once per file
    // under it) and sort deepest-first so every child is already emitted.
    for children in child_dirs.values_mut() {
        children.sort();
        children.dedup();
    }
    all_dirs.sort_by_key(|d| std::cmp::Reverse(d.matches('/').count()));
    all_dirs.dedup();

    let mut dir_fingerprint: HashMap<String, [u8; 16]> = HashMap::new();
    let mut packets = Vec::new();
    for dir in &all_dirs {
        let name = dir.rsplit('/').next().unwrap_or(dir).to_string();
        let mut children: Vec<[u8; 16]> = Vec::new();
        if let Some(fs) = child_files.get(dir) {
            for f in fs {
                let rel = if dir.is_empty() { f.clone() } else { format!("{dir}/{f}") };
                if let Some(fp) = file_fingerprint_by_rel.get(&rel) {
                    children.push(*fp);
                }
            }
        }
        if let Some(ds) = child_dirs.get(dir) {
            for d in ds {
                if let Some(fp) = dir_fingerprint.get(d) {
                    children.push(*fp);
                }
            }
        }
        let body = PacketBody::Directory(DirectoryBody { name, options: Vec::new(), children });
        let bytes = write_packet(input_set_id, &body);
        let fp: [u8; 16] = bytes[8..24].try_into().unwrap();
        dir_fingerprint.insert(dir.clone(), fp);
        packets.push(bytes);
    }

    let mut root_children: Vec<[u8; 16]> = Vec::new();
    if let Some(fs) = child_files.get("") {
        for f in fs {
            if let Some(fp) = file_fingerprint_by_rel.get(f) {
                root_children.push(*fp);
            }
        }
    }
    if let Some(ds) = child_dirs.get("") {
        for d in ds {
            if let Some(fp) = dir_fingerprint.get(d) {
                root_children.push(*fp);
            }
        }
    }

    (packets, root_children)
}

#[allow(clippy::too_many_arguments)]
fn create(
    block_size: u64,
    recovery_blocks: u64,
    strategy: MapperStrategy,
    file_count: u64,
    output: &Path,
    include: &[String],
    exclude: &[String],
    inputs: &[PathBuf],
) -> Result<ReturnCode> {
    let (inc, exc) = build_globset(include, exclude)?;
    let files = list_files(inputs, &inc, &exc)?;
    if files.is_empty() {
        return Err(anyhow!("no input files matched"));
    }
    info!(file_count = files.len(), block_size, recovery_blocks, ?strategy, "discovered input files");

    let mut graph = Par3Graph::new(block_size);
    let mut mapper = Mapper::new(strategy, block_size);
    // `block_bytes[i]` holds the live contents of block `i`, assembled as
    // each file is fed through the mapper. The core never buffers this
    // itself; the CLI keeps it only long enough to drive the Reed-Solomon
    // encoder below.
    let mut block_bytes: Vec<Vec<u8>> = Vec::new();

    for (rel, path) in &files {
        let data = fs::read(path).with_context(|| format!("read {}", path.display()))?;
        let file_idx = mapper.begin_file(&mut graph, rel.clone());
        mapper.feed(&mut graph, &data)?;
        mapper.end_file(&mut graph)?;

        while block_bytes.len() < graph.blocks.len() {
            block_bytes.push(vec![0u8; block_size as usize]);
        }
        for slice in graph.slices.iter().filter(|s| s.file == file_idx) {
            let block = slice.block;
            let start = slice.offset as usize;
            let end = start + slice.length as usize;
            let tail_start = slice.tail_offset as usize;
            let tail_end = tail_start + slice.length as usize;
            block_bytes[block][tail_start..tail_end].copy_from_slice(&data[start..end]);
        }
    }

    // Spec §4.B: field width depends on block_count + recovery_block_count,
    // not input blocks alone. Repair needs to reproduce this exact count, so
    // it's stamped into the Cauchy Packet below rather than re-derived.
    let total_blocks = graph.blocks.len() as u64 + recovery_blocks;
    let width = GaloisWidth::select(total_blocks);
    debug!(total_blocks, ?width, "selected Galois field width");
    let gf = par3_core::galois::GaloisField::new(width);

    let input_set_id = compute_input_set_id(&graph, &files, block_size);

    // Encode: every full/tail-packed block contributes to every recovery row.
    let block_count = graph.blocks.len();
    let mut recovery_regions: Vec<Region> =
        (0..recovery_blocks as usize).map(|_| Region::zeroed(block_size as usize)).collect();
    for (x_index, bytes) in block_bytes.iter().enumerate().take(block_count) {
        let mut work = Region::from_data(block_size as usize, bytes);
        work.stamp_parity(&gf);
        rs::accumulate_input_into_recovery(&gf, x_index as u32, &work, &mut recovery_regions, 0)?;
    }
    for r in &mut recovery_regions {
        r.stamp_parity(&gf);
    }

    let start_body = StartBody {
        parent_set_id: 0,
        parent_root_fp: [0; 16],
        block_size,
        galois_width: match width {
            GaloisWidth::Gf8 => 1,
            GaloisWidth::Gf16 => 2,
        },
        generator: match width {
            GaloisWidth::Gf8 => vec![(width.generator() & 0xFF) as u8],
            GaloisWidth::Gf16 => width.generator().to_le_bytes()[..2].to_vec(),
        },
    };
    // `row_hints` is otherwise free-form (the spec leaves its contents to the
    // implementation); we put the recovery-block total up front so repair
    // can reselect the same Galois field width later. See DESIGN.md.
    let cauchy_body = CauchyBody { row_hints: recovery_blocks.to_le_bytes().to_vec() };

    let mut file_packet_bytes: Vec<(Vec<u8>, [u8; 16])> = Vec::new();
    let mut file_fingerprint_by_rel: HashMap<String, [u8; 16]> = HashMap::new();
    for (rel, _) in &files {
        let file_idx = graph.files.iter().position(|f| &f.name == rel).unwrap();
        let fe = &graph.files[file_idx];
        let body = PacketBody::File(FileBody {
            name: fe.name.clone(),
            first_16k_crc: fe.first_16k_crc,
            fingerprint: fe.fingerprint,
            options: Vec::new(),
            chunks: fe.chunks.iter().map(|&c| graph.chunks[c].clone()).collect(),
        });
        let bytes = write_packet(input_set_id, &body);
        let fp: [u8; 16] = bytes[8..24].try_into().unwrap();
        file_fingerprint_by_rel.insert(rel.clone(), fp);
        file_packet_bytes.push((bytes, fp));
    }

    // Spec §3/§6: the directory tree is a forest of Directory Packets whose
    // children are the fingerprints of the File/Directory packets directly
    // beneath them; the Root Packet's children are the logical root's direct
    // entries. Built bottom-up so each Directory Packet's children are
    // already emitted (and fingerprinted) by the time it's written.
    let (directory_packet_bytes, root_children) =
        build_directory_packets(input_set_id, &files, &file_fingerprint_by_rel);

    let root_body = RootBody {
        next_free_block_index: graph.blocks.len() as u64,
        attributes: 0,
        options: Vec::new(),
        children: root_children,
    };
    let root_bytes = write_packet(input_set_id, &PacketBody::Root(root_body));
    let root_fp: [u8; 16] = root_bytes[8..24].try_into().unwrap();

    let mut common_bundle = Vec::new();
    common_bundle.extend_from_slice(&write_packet(input_set_id, &PacketBody::Start(start_body)));
    common_bundle.extend_from_slice(&write_packet(input_set_id, &PacketBody::Cauchy(cauchy_body)));
    for (bytes, _) in &file_packet_bytes {
        common_bundle.extend_from_slice(bytes);
    }
    for bytes in &directory_packet_bytes {
        common_bundle.extend_from_slice(bytes);
    }
    common_bundle.extend_from_slice(&root_bytes);

    let index_path = output.with_extension("par3");
    fs::write(&index_path, &common_bundle).with_context(|| format!("write {}", index_path.display()))?;
    debug!(bytes = common_bundle.len(), path = %index_path.display(), "wrote index packets");
    println!("wrote index {}", index_path.display());

    if recovery_blocks > 0 {
        let base = output.file_name().and_then(|s| s.to_str()).unwrap_or("par3").to_string();
        let counts = container::plan_file_block_counts(recovery_blocks, SizingScheme::Uniform { file_count });
        let ranges = container::plan_to_ranges(&counts);
        let width = container::name_field_width(&ranges);
        for &(start, count) in &ranges {
            let mut payload_packets = Vec::new();
            for i in 0..count {
                let idx = start + i;
                let recovery_body = RecoveryBody {
                    root_fp,
                    matrix_fp: [0; 16],
                    recovery_block_index: idx,
                    payload: recovery_regions[idx as usize].data().to_vec(),
                };
                payload_packets.push(write_packet(input_set_id, &PacketBody::Recovery(recovery_body)));
            }
            let file_bytes = container::assemble_payload_file(&common_bundle, &payload_packets);
            let name = container::recovery_filename(&base, start, count, width);
            let path = output.with_file_name(&name);
            fs::write(&path, &file_bytes).with_context(|| format!("write {}", path.display()))?;
            println!("wrote recovery volume {}", path.display());
        }
    }

    println!(
        "{} file(s), {} block(s) ({:?}), {} recovery block(s)",
        files.len(),
        graph.blocks.len(),
        width,
        recovery_blocks
    );
    Ok(ReturnCode::Success)
}

/// Spec §3 InputSetID: deterministic for identical inputs, derived from file
/// names/sizes/fingerprints and the block size.
fn compute_input_set_id(graph: &Par3Graph, files: &[(String, PathBuf)], block_size: u64) -> u64 {
    let mut hasher = FingerprintHasher::new();
    hasher.update(&block_size.to_le_bytes());
    for (rel, _) in files {
        hasher.update(rel.as_bytes());
    }
    for f in &graph.files {
        hasher.update(&f.size.to_le_bytes());
        hasher.update(&f.fingerprint);
    }
    let fp = hasher.finalize_to_16();
    u64::from_le_bytes(fp[..8].try_into().unwrap())
}

fn read_par_files(par_files: &[PathBuf]) -> Result<Vec<Vec<u8>>> {
    par_files.iter().map(|p| fs::read(p).with_context(|| format!("read {}", p.display()))).collect()
}

fn scan_and_materialize(par_files: &[PathBuf]) -> Result<(PacketStore, Par3Graph, u64)> {
    let raw = read_par_files(par_files)?;
    let mut store = PacketStore::new();
    // Packet headers are self-describing; a conservative block-size hint of
    // u64::MAX only matters for chunk-descriptor decoding within File
    // Packets scanned before a Start Packet is known, which the scanner
    // tolerates by deferring decode failures to `SkipReason`.
    for bytes in &raw {
        store.scan(bytes, u64::MAX);
    }
    let (effective, ancestors) = packetset::resolve_effective_set(&store)?;
    let mut keep = ancestors.clone();
    keep.insert(effective);
    store.prune(effective, &keep);
    let graph = packetset::materialize(&store, effective, &ancestors)?;
    Ok((store, graph, effective))
}

fn verify(par_files: &[PathBuf], root: &Path) -> Result<ReturnCode> {
    let (_store, mut graph, _effective) = scan_and_materialize(par_files)?;

    let known: Vec<KnownFile> = graph
        .files
        .iter()
        .enumerate()
        .map(|(i, f)| KnownFile { file_index: i, size: f.size, first_16k_crc: f.first_16k_crc, fingerprint: f.fingerprint })
        .collect();

    let mut searcher = Searcher::new(&graph, SearchBudget::default());
    for f in graph.files.clone() {
        let Ok(path) = validate_path(root, Path::new(&f.name), PathPolicy::default()) else {
            continue;
        };
        let data = match fs::read(&path) {
            Ok(d) => d,
            Err(_) => continue,
        };
        if searcher.try_fast_match(&mut graph, &f.name, &data, &known).is_none() {
            debug!(file = %f.name, "fast match failed, falling back to slide search");
            searcher.slide_scan(&mut graph, &f.name, &data);
        }
    }
    search::merge_redundant_block_matches(&mut graph);
    search::finalize_tail_block_completeness(&mut graph);

    let lost = repair::identify_lost_blocks(&graph);
    if lost.is_empty() {
        info!("verify: all blocks present");
    } else {
        warn!(missing = lost.len(), total = graph.blocks.len(), "verify: blocks missing");
    }
    println!("{} of {} blocks missing", lost.len(), graph.blocks.len());
    if lost.is_empty() {
        Ok(ReturnCode::Success)
    } else {
        Ok(ReturnCode::RepairPossible)
    }
}

fn repair_cmd(par_files: &[PathBuf], root: &Path) -> Result<ReturnCode> {
    let (store, mut graph, effective) = scan_and_materialize(par_files)?;
    let known: Vec<KnownFile> = graph
        .files
        .iter()
        .enumerate()
        .map(|(i, f)| KnownFile { file_index: i, size: f.size, first_16k_crc: f.first_16k_crc, fingerprint: f.fingerprint })
        .collect();

    let mut searcher = Searcher::new(&graph, SearchBudget::default());
    let mut file_buffers: HashMap<String, Vec<u8>> = HashMap::new();
    let mut available_inputs: HashMap<usize, Vec<u8>> = HashMap::new();

    for f in graph.files.clone() {
        let data = match validate_path(root, Path::new(&f.name), PathPolicy::default()) {
            Ok(path) => fs::read(path).unwrap_or_default(),
            Err(_) => Vec::new(),
        };
        if !data.is_empty() && searcher.try_fast_match(&mut graph, &f.name, &data, &known).is_none() {
            searcher.slide_scan(&mut graph, &f.name, &data);
        }
        let mut buf = data;
        buf.resize(f.size as usize, 0);
        file_buffers.insert(f.name.clone(), buf);
    }
    search::merge_redundant_block_matches(&mut graph);
    search::finalize_tail_block_completeness(&mut graph);

    // Encode accumulates every full *and* tail-packed block into every
    // recovery row, so a surviving tail-packed block is as much a required
    // decode input as a surviving full block. Assemble each block's bytes
    // from all of its located slices at their `tail_offset`, not just the
    // single slice that fills a full block.
    for block in 0..graph.blocks.len() {
        let mut buf = vec![0u8; graph.block_size as usize];
        let mut any_located = false;
        for slice in graph.slices_of(block) {
            if let Some((name, offset)) = &slice.located_at {
                if let Some(file_buf) = file_buffers.get(name) {
                    let start = *offset as usize;
                    let end = start + slice.length as usize;
                    if end <= file_buf.len() {
                        let tail_start = slice.tail_offset as usize;
                        let tail_end = tail_start + slice.length as usize;
                        buf[tail_start..tail_end].copy_from_slice(&file_buf[start..end]);
                        any_located = true;
                    }
                }
            }
        }
        if any_located {
            available_inputs.insert(block, buf);
        }
    }

    let lost = repair::identify_lost_blocks(&graph);
    if lost.is_empty() {
        info!("nothing to repair");
        println!("nothing to repair");
        return Ok(ReturnCode::Success);
    }
    info!(lost = lost.len(), "attempting repair");

    let available_recovery: HashMap<usize, Vec<u8>> =
        store.recovery_payloads().map(|(idx, payload)| (idx as usize, payload)).collect();

    // Same total used at creation time, recovered from the Cauchy Packet
    // rather than just "however many recovery packets survived".
    let total_recovery = store.total_recovery_block_count(effective).unwrap_or(available_recovery.len() as u64);
    let width = GaloisWidth::select(graph.blocks.len() as u64 + total_recovery);
    debug!(?width, available_recovery = available_recovery.len(), "building repair decode matrix");
    let gf = par3_core::galois::GaloisField::new(width);

    let outcome = repair::plan_repair(
        &gf,
        graph.blocks.len(),
        graph.block_size as usize,
        &lost,
        &available_inputs,
        &available_recovery,
    )?;

    match outcome {
        repair::RepairOutcome::NotPossible { lost, available_recovery } => {
            warn!(lost, available_recovery, "repair not possible");
            println!("repair not possible: {lost} lost blocks, {available_recovery} recovery blocks available");
            Ok(ReturnCode::RepairNotPossible)
        }
        repair::RepairOutcome::Repaired { blocks } => {
            repair::apply_reconstructed_blocks(&graph, &blocks, &mut file_buffers)?;
            repair::write_inline_tails(&graph, &mut file_buffers)?;
            for f in &graph.files {
                let path = validate_path(root, Path::new(&f.name), PathPolicy::default())
                    .with_context(|| format!("unsafe file path in File Packet: {}", f.name))?;
                fs::write(&path, &file_buffers[&f.name]).with_context(|| format!("write {}", path.display()))?;
            }
            info!(blocks = blocks.len(), "repair complete");
            println!("repaired {} block(s)", blocks.len());
            Ok(ReturnCode::Success)
        }
    }
}

fn list(par_files: &[PathBuf]) -> Result<ReturnCode> {
    let (_store, graph, _effective) = scan_and_materialize(par_files)?;
    for f in &graph.files {
        println!("{}\t{}\t{}", f.name, f.size, hex16(&f.fingerprint));
    }
    Ok(ReturnCode::Success)
}

fn hex16(bytes: &[u8; 16]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
