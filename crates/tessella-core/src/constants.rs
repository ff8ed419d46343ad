//! Application-wide constants.

/// Chunk size for streamed ingest reads and export digesting. 64 KiB keeps
/// memory bounded while staying friendly to network and NAS IO.
pub const INGEST_CHUNK_SIZE: usize = 64 * 1024;

/// Canvas width/height used in presentation manifests when no raster
/// dimensions could be extracted for an asset. Viewers handle a square
/// placeholder gracefully; real dimensions replace it after conversion.
pub const PLACEHOLDER_CANVAS_DIM: u32 = 1000;

/// Tile edge length for pyramidal derivatives.
pub const DERIVATIVE_TILE_SIZE: u32 = 256;

/// Extension given to normalized pyramidal derivatives.
pub const DERIVATIVE_EXTENSION: &str = "tif";

/// BagIt declaration markers written into every preservation package.
pub const BAGIT_VERSION: &str = "0.97";
pub const TAG_FILE_ENCODING: &str = "UTF-8";
