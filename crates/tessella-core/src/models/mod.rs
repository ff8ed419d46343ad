pub mod asset;

pub use asset::{meta, Asset, AssetStatus, IngestReceipt, NewAsset};
