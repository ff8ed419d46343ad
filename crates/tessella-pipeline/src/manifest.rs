//! Presentation manifest generation (IIIF Presentation API 3.0 shape).
//!
//! `build_manifest` is a pure mapping from a registry record plus resolved
//! base URLs to a manifest document: one canvas, one annotation page, one
//! painting annotation whose image-service identifier is keyed by the
//! asset's *current* storage filename — so it tracks conversion-driven
//! renames, not the original upload name.

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde_json::{json, Value as JsonValue};
use tessella_core::constants::PLACEHOLDER_CANVAS_DIM;
use tessella_core::{meta, Asset, Config};

/// Characters escaped in an image-service path segment. Everything a URL
/// path treats specially, plus space and the percent sign itself.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Default port of the external image service, used by the host heuristic
/// when no explicit configuration or forwarded headers are available.
const IMAGE_SERVICE_DEFAULT_PORT: u16 = 8182;

/// Request headers relevant to base URL resolution.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub forwarded_host: Option<String>,
    pub forwarded_proto: Option<String>,
    pub forwarded_prefix: Option<String>,
    pub host: Option<String>,
}

/// The two base URLs every manifest is built against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBases {
    pub api_base: String,
    pub image_service_base: String,
}

impl ResolvedBases {
    /// Resolve base URLs in priority order: explicit configuration, then
    /// reverse-proxy forwarded headers, then a heuristic on the raw inbound
    /// host header.
    pub fn resolve(config: &Config, ctx: &RequestContext) -> Self {
        let api_base = if let Some(configured) = &config.api_public_url {
            configured.trim_end_matches('/').to_string()
        } else if let Some(fwd_host) = &ctx.forwarded_host {
            let proto = ctx.forwarded_proto.as_deref().unwrap_or("http");
            let prefix = ctx
                .forwarded_prefix
                .as_deref()
                .map(|p| p.trim_end_matches('/'))
                .unwrap_or("");
            format!("{}://{}{}", proto, fwd_host, prefix)
        } else {
            let host = ctx.host.as_deref().unwrap_or("localhost:8000");
            format!("http://{}", host)
        };

        let image_service_base = if let Some(configured) = &config.image_service_url {
            configured.trim_end_matches('/').to_string()
        } else {
            // Heuristic: the image service conventionally runs beside the
            // API on its own port.
            let host = ctx
                .forwarded_host
                .as_deref()
                .or(ctx.host.as_deref())
                .unwrap_or("localhost");
            let hostname = host.split(':').next().unwrap_or(host);
            format!(
                "http://{}:{}/iiif/2",
                hostname, IMAGE_SERVICE_DEFAULT_PORT
            )
        };

        ResolvedBases {
            api_base,
            image_service_base,
        }
    }
}

/// Build the presentation manifest for an asset.
pub fn build_manifest(asset: &Asset, bases: &ResolvedBases) -> JsonValue {
    let manifest_id = format!("{}/iiif/{}/manifest", bases.api_base, asset.id);
    let canvas_id = format!("{}/iiif/{}/canvas/1", bases.api_base, asset.id);
    let annotation_page_id = format!("{}/iiif/{}/page/1", bases.api_base, asset.id);
    let annotation_id = format!("{}/iiif/{}/annotation/1", bases.api_base, asset.id);

    // The image service serves by filename; key it by the current storage
    // filename so the manifest follows the derivative after conversion.
    let encoded_name =
        utf8_percent_encode(asset.current_storage_filename(), PATH_SEGMENT).to_string();
    let image_service_id = format!("{}/{}", bases.image_service_base, encoded_name);

    let (width, height) = asset
        .dimensions()
        .unwrap_or((PLACEHOLDER_CANVAS_DIM, PLACEHOLDER_CANVAS_DIM));

    let mut metadata_pairs = vec![
        descriptive_pair("File Size", format!("{} bytes", asset.file_size)),
        descriptive_pair("MIME Type", asset.content_type.clone()),
        descriptive_pair("Uploaded At", asset.created_at.to_rfc3339()),
    ];

    if let Some(map) = asset.metadata_object() {
        for (key, value) in map {
            if meta::SUPPRESSED.contains(&key.as_str()) {
                continue;
            }
            metadata_pairs.push(descriptive_pair(key.as_str(), stringify(value)));
        }
    }

    json!({
        "@context": "http://iiif.io/api/presentation/3/context.json",
        "id": manifest_id,
        "type": "Manifest",
        "label": { "en": [asset.filename.clone()] },
        "metadata": metadata_pairs,
        "items": [
            {
                "id": canvas_id.clone(),
                "type": "Canvas",
                "label": { "en": ["Page 1"] },
                "height": height,
                "width": width,
                "items": [
                    {
                        "id": annotation_page_id,
                        "type": "AnnotationPage",
                        "items": [
                            {
                                "id": annotation_id,
                                "type": "Annotation",
                                "motivation": "painting",
                                "target": canvas_id,
                                "body": {
                                    "id": format!("{}/full/max/0/default.jpg", image_service_id),
                                    "type": "Image",
                                    "format": "image/jpeg",
                                    "service": [
                                        {
                                            "id": image_service_id,
                                            "type": "ImageService2",
                                            "profile": "level2"
                                        }
                                    ]
                                }
                            }
                        ]
                    }
                ]
            }
        ]
    })
}

fn descriptive_pair(label: impl Into<String>, value: String) -> JsonValue {
    json!({
        "label": { "en": [label.into()] },
        "value": { "en": [value] }
    })
}

/// Metadata values surface as display strings; scalars lose their JSON
/// quoting, anything structured keeps it.
fn stringify(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}
