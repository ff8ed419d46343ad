pub mod assets;
pub mod export;
pub mod ingest;
pub mod manifest;
