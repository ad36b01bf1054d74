//! Zarr V2 arrays and groups on top of any key/value store.
//!
//! A store only needs `get`/`put`/`delete`/`list` ([`StorageBackend`]).
//! Arrays are described by `.zarray`, groups by `.zgroup`, user attributes
//! by `.zattrs`, and each chunk lives at a key derived from its grid
//! coordinate. Hierarchy membership is read back from the key listing.

pub mod array;
pub mod chunk_grid;
pub mod codecs;
pub mod consolidated;
pub mod error;
pub mod fill_value;
pub mod group;
pub mod metadata;
pub mod path;
pub mod store;
pub mod types;

// Re-export key types at crate root for convenience.
pub use array::ZarrArray;
pub use chunk_grid::{ChunkGrid, DimensionSeparator};
pub use codecs::{Codec, CodecPipeline, CodecRegistry, CodecSpec};
pub use consolidated::{ConsolidatedMetadata, consolidate_metadata, read_consolidated};
pub use error::{ZarrError, ZarrResult};
pub use fill_value::FillValue;
pub use group::{Hierarchy, NodeKind, ZarrGroup};
pub use metadata::{ArrayMetadata, Attributes, GroupMetadata};
pub use store::{LocalBackend, MemoryBackend, ObjectStoreBackend, StorageBackend};
pub use types::{ArrayOrder, DTypeDescriptor, Endian, PrimitiveType, StructField, TypeKind};
