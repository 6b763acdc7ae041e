//! IIIF Presentation v3 data model and manifest mapping
//!
//! The mapper turns a validated record plus resolved image geometry
//! into an in-memory manifest. It performs no I/O and is fully
//! deterministic: identical (record, descriptors, configuration)
//! inputs produce byte-identical serialized manifests, which the
//! writer's partial-mode fingerprinting relies on.
//!
//! Serialized key order is the struct field order below; do not
//! reorder fields without understanding that existing fingerprints
//! will all change.

use crate::config::PipelineConfig;
use crate::record::SpecimenRecord;
use crate::resolver::{ImageDescriptor, ResolutionStatus};
use serde::Serialize;
use std::collections::BTreeMap;

/// IIIF Presentation v3 context URI
pub const PRESENTATION_CONTEXT: &str = "http://iiif.io/api/presentation/3/context.json";

/// Darwin Core keys assembled into the composite scientific name,
/// in assembly order
pub const SCIENTIFIC_NAME_KEYS: [&str; 5] = [
    "genus",
    "subgenus",
    "specificEpithet",
    "infraspecificEpithet",
    "scientificNameAuthorship",
];

/// Language-tagged string values (`{"en": ["..."]}`)
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct LanguageMap(BTreeMap<String, Vec<String>>);

impl LanguageMap {
    /// Single value under a single language tag
    pub fn single(lang: &str, value: impl Into<String>) -> Self {
        let mut map = BTreeMap::new();
        map.insert(lang.to_string(), vec![value.into()]);
        Self(map)
    }
}

/// One label/value row of manifest metadata
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MetadataEntry {
    pub label: LanguageMap,
    pub value: LanguageMap,
}

/// Image service reference on an annotation body
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ImageService {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub profile: String,
}

/// Painting annotation body
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ImageBody {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub format: String,
    pub service: ImageService,
}

/// Painting annotation targeting a canvas
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Annotation {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub motivation: String,
    pub body: ImageBody,
    pub target: String,
}

/// Annotation page holding a canvas's painting annotations
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AnnotationPage {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub items: Vec<Annotation>,
}

/// One displayable image of the specimen
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Canvas {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub width: u32,
    pub height: u32,
    pub items: Vec<AnnotationPage>,
}

/// IIIF Presentation v3 manifest for one specimen
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Manifest {
    #[serde(rename = "@context")]
    pub context: String,
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub label: LanguageMap,
    pub metadata: Vec<MetadataEntry>,
    pub rights: String,
    pub items: Vec<Canvas>,
}

/// Signal that no descriptor resolved, so there is no manifest to emit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoUsableImages;

/// Maps validated records and resolved geometry into manifests
///
/// The configured key list is resolved once at construction, not
/// re-interpreted per record.
pub struct ManifestMapper {
    language: String,
    rights: String,
    manifest_base: String,
    image_service_base: String,
    /// Configured metadata keys minus the scientific-name parts,
    /// in configured order
    plain_keys: Vec<String>,
}

impl ManifestMapper {
    pub fn new(config: &PipelineConfig) -> Self {
        let plain_keys = config
            .metadata_keys
            .iter()
            .filter(|k| !SCIENTIFIC_NAME_KEYS.contains(&k.as_str()))
            .cloned()
            .collect();

        Self {
            language: config.default_language.clone(),
            rights: config.manifest.rights.clone(),
            manifest_base: config.manifest_base().to_string(),
            image_service_base: config.image_service_base().to_string(),
            plain_keys,
        }
    }

    /// The published identifier for a specimen's manifest
    pub fn manifest_id(&self, catalog_number: &str) -> String {
        format!("{}/{}.json", self.manifest_base, catalog_number)
    }

    /// Assemble the composite scientific name from its Darwin Core parts
    pub fn scientific_name(record: &SpecimenRecord) -> String {
        SCIENTIFIC_NAME_KEYS
            .iter()
            .filter_map(|key| record.field(key))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Build the manifest for one record
    ///
    /// Returns [`NoUsableImages`] when no descriptor resolved; the
    /// caller emits no file for such records.
    pub fn map(
        &self,
        record: &SpecimenRecord,
        descriptors: &[ImageDescriptor],
    ) -> Result<Manifest, NoUsableImages> {
        let resolved: Vec<&ImageDescriptor> =
            descriptors.iter().filter(|d| d.is_resolved()).collect();
        if resolved.is_empty() {
            return Err(NoUsableImages);
        }

        let manifest_id = self.manifest_id(&record.catalog_number);
        let scientific_name = Self::scientific_name(record);

        let label_text = if scientific_name.is_empty() {
            record.catalog_number.clone()
        } else {
            format!("{} - {}", record.catalog_number, scientific_name)
        };

        Ok(Manifest {
            context: PRESENTATION_CONTEXT.to_string(),
            id: manifest_id.clone(),
            kind: "Manifest".to_string(),
            label: LanguageMap::single(&self.language, label_text),
            metadata: self.build_metadata(record, &scientific_name),
            rights: self.rights.clone(),
            items: self.build_canvases(&manifest_id, &resolved),
        })
    }

    /// Metadata rows: composite scientific name first, then the
    /// configured keys in order, blank values omitted
    fn build_metadata(&self, record: &SpecimenRecord, scientific_name: &str) -> Vec<MetadataEntry> {
        let mut metadata = Vec::new();

        if !scientific_name.is_empty() {
            metadata.push(MetadataEntry {
                label: LanguageMap::single(&self.language, "ScientificName"),
                value: LanguageMap::single(&self.language, scientific_name),
            });
        }

        for key in &self.plain_keys {
            if let Some(value) = record.field(key) {
                metadata.push(MetadataEntry {
                    label: LanguageMap::single(&self.language, key.clone()),
                    value: LanguageMap::single(&self.language, value),
                });
            }
        }

        metadata
    }

    /// One canvas per resolved descriptor, input order, 1-based ids
    fn build_canvases(&self, manifest_id: &str, resolved: &[&ImageDescriptor]) -> Vec<Canvas> {
        resolved
            .iter()
            .enumerate()
            .map(|(i, descriptor)| {
                let (width, height, service_id) = match &descriptor.status {
                    ResolutionStatus::Resolved {
                        width,
                        height,
                        service_id,
                    } => (*width, *height, service_id.as_str()),
                    // filter above guarantees Resolved
                    _ => unreachable!("unresolved descriptor in canvas list"),
                };

                let canvas_id = format!("{}/canvas/{}", manifest_id, i + 1);
                let image_filename = service_id
                    .trim_end_matches('/')
                    .rsplit('/')
                    .next()
                    .unwrap_or("unknown_image");

                Canvas {
                    id: canvas_id.clone(),
                    kind: "Canvas".to_string(),
                    width,
                    height,
                    items: vec![AnnotationPage {
                        id: format!("{}/page/1", canvas_id),
                        kind: "AnnotationPage".to_string(),
                        items: vec![Annotation {
                            id: format!("{}/annotation/1", canvas_id),
                            kind: "Annotation".to_string(),
                            motivation: "painting".to_string(),
                            body: ImageBody {
                                id: format!("{}/{}", self.image_service_base, image_filename),
                                kind: "Image".to_string(),
                                format: "image/jpeg".to_string(),
                                service: ImageService {
                                    id: service_id.to_string(),
                                    kind: "ImageService3".to_string(),
                                    profile: "level2".to_string(),
                                },
                            },
                            target: canvas_id,
                        }],
                    }],
                }
            })
            .collect()
    }
}
