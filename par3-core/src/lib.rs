//! PAR3 core: content-defined chunking with dedup/tail-packing, a
//! packet-based container format, and Galois-field Reed-Solomon erasure
//! coding with rolling-CRC search for damaged-file repair.

pub mod chunkmap;
pub mod container;
pub mod context;
pub mod error;
pub mod galois;
pub mod hash;
pub mod model;
pub mod packet;
pub mod packetset;
pub mod path_safety;
pub mod repair;
pub mod rs;
pub mod search;

pub use error::{Par3Error, Result, ReturnCode};
