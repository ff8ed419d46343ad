//! Tessella pipeline: the core asset lifecycle.
//!
//! Ingest verifies fixity while streaming to staging storage and commits
//! all-or-nothing; the conversion queue normalizes masters into pyramidal
//! tiled derivatives on an async worker pool and rewrites the registry; the
//! manifest builder maps a registry record to a presentation document; the
//! exporter assembles checksum-verified preservation packages.

pub mod convert;
pub mod engine;
pub mod export;
pub mod ingest;
pub mod manifest;
pub mod probe;
pub mod service;

pub use convert::{ConversionQueue, ConversionQueueConfig};
pub use engine::{CopyRasterEngine, FailingRasterEngine, RasterEngine, RasterInfo, VipsCliEngine};
pub use export::{ExportArtifact, Exporter};
pub use ingest::{IngestService, Submission};
pub use manifest::{build_manifest, RequestContext, ResolvedBases};
pub use probe::TechnicalMetadataExtractor;
pub use service::AssetService;
