//! STAC catalog mock
//!
//! Canned STAC 1.0.0 documents for the Angola EEZ ocean-data collections.
//! These stand in for the real STAC service during frontend development and
//! outages: no upstream, no persistent state, documents served as-is
//! (never wrapped in the gateway envelope).

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::handlers::AppState;

pub const STAC_VERSION: &str = "1.0.0";
pub const CATALOG_ID: &str = "bgapp-catalog";

/// Angola EEZ bounding box as the source data publishes it.
pub const ANGOLA_EEZ_BBOX: [f64; 4] = [-18.2, 8.5, -4.2, 17.5];

const TEMPORAL_START: &str = "2024-01-01T00:00:00Z";
const LICENSE: &str = "CC-BY-4.0";
const DEFAULT_SEARCH_LIMIT: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub rel: String,
    pub href: String,
    #[serde(rename = "type")]
    pub media_type: String,
}

fn link(rel: &str, href: &str, media_type: &str) -> Link {
    Link {
        rel: rel.to_string(),
        href: href.to_string(),
        media_type: media_type.to_string(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpatialExtent {
    pub bbox: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalExtent {
    pub interval: Vec<Vec<Option<String>>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Extent {
    pub spatial: SpatialExtent,
    pub temporal: TemporalExtent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    #[serde(rename = "type")]
    pub collection_type: String,
    pub stac_version: String,
    pub id: String,
    pub title: String,
    pub description: String,
    pub license: String,
    pub keywords: Vec<String>,
    pub extent: Extent,
    pub links: Vec<Link>,
}

fn collection(id: &str, title: &str, description: &str, keywords: &[&str]) -> Collection {
    Collection {
        collection_type: "Collection".to_string(),
        stac_version: STAC_VERSION.to_string(),
        id: id.to_string(),
        title: title.to_string(),
        description: description.to_string(),
        license: LICENSE.to_string(),
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
        extent: Extent {
            spatial: SpatialExtent {
                bbox: vec![ANGOLA_EEZ_BBOX.to_vec()],
            },
            temporal: TemporalExtent {
                interval: vec![vec![Some(TEMPORAL_START.to_string()), None]],
            },
        },
        links: vec![
            link("self", &format!("/collections/{}", id), "application/json"),
            link(
                "items",
                &format!("/collections/{}/items", id),
                "application/geo+json",
            ),
            link("root", "/", "application/json"),
        ],
    }
}

/// The three collections the dashboards rely on.
pub static COLLECTIONS: Lazy<Vec<Collection>> = Lazy::new(|| {
    vec![
        collection(
            "zee_angola_sst",
            "Temperatura da Superfície do Mar - ZEE Angola",
            "Série temporal de temperatura da superfície do mar (Copernicus Marine) \
             para a Zona Económica Exclusiva de Angola",
            &["oceanografia", "sst", "angola", "zee"],
        ),
        collection(
            "zee_angola_chlorophyll",
            "Clorofila-a - ZEE Angola",
            "Concentração de clorofila-a derivada de deteção remota para a Zona \
             Económica Exclusiva de Angola",
            &["oceanografia", "clorofila", "angola", "zee"],
        ),
        collection(
            "zee_angola_biodiversity",
            "Biodiversidade Marinha - ZEE Angola",
            "Ocorrências de espécies marinhas (GBIF/OBIS) na Zona Económica \
             Exclusiva de Angola",
            &["biodiversidade", "angola", "zee", "obis"],
        ),
    ]
});

pub fn collection_ids() -> Vec<String> {
    COLLECTIONS.iter().map(|c| c.id.clone()).collect()
}

pub fn find_collection(id: &str) -> Option<&'static Collection> {
    COLLECTIONS.iter().find(|c| c.id == id)
}

fn not_found_body() -> serde_json::Value {
    json!({
        "error": "Collection not found",
        "available_collections": collection_ids(),
    })
}

fn collection_not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(not_found_body())).into_response()
}

/// Deterministic sample items: three coastal stations inside the EEZ with
/// per-collection measurement properties.
fn sample_features(collection: &Collection) -> Vec<serde_json::Value> {
    let stations = [
        ("luanda", 13.2, -8.8),
        ("benguela", 13.4, -12.6),
        ("namibe", 12.1, -15.2),
    ];

    stations
        .iter()
        .enumerate()
        .map(|(index, (station, lon, lat))| {
            let properties = match collection.id.as_str() {
                "zee_angola_sst" => json!({
                    "datetime": "2024-06-15T00:00:00Z",
                    "station": station,
                    "sst": 24.3 - index as f64 * 1.7,
                    "units": "degC",
                }),
                "zee_angola_chlorophyll" => json!({
                    "datetime": "2024-06-15T00:00:00Z",
                    "station": station,
                    "chla": 0.52 + index as f64 * 0.31,
                    "units": "mg/m3",
                }),
                _ => json!({
                    "datetime": "2024-06-15T00:00:00Z",
                    "station": station,
                    "species_count": 138 + index * 47,
                    "source": "GBIF/OBIS",
                }),
            };
            json!({
                "type": "Feature",
                "stac_version": STAC_VERSION,
                "id": format!("{}-{}-{:03}", collection.id, station, index + 1),
                "collection": collection.id,
                "geometry": {
                    "type": "Point",
                    "coordinates": [lon, lat],
                },
                "bbox": [lon, lat, lon, lat],
                "properties": properties,
                "assets": {},
                "links": [],
            })
        })
        .collect()
}

fn feature_collection(features: Vec<serde_json::Value>, limit: usize) -> serde_json::Value {
    let matched = features.len();
    let mut features = features;
    features.truncate(limit);
    json!({
        "type": "FeatureCollection",
        "features": features,
        "context": {
            "returned": features.len(),
            "limit": limit,
            "matched": matched,
        },
    })
}

pub async fn catalog_handler(State(state): State<Arc<AppState>>) -> Response {
    state.metrics.incr_mock_hits();
    Json(json!({
        "type": "Catalog",
        "stac_version": STAC_VERSION,
        "id": CATALOG_ID,
        "title": "BGAPP STAC Catalog",
        "description": "Catálogo de dados oceanográficos da ZEE Angola",
        "conformsTo": ["https://api.stacspec.org/v1.0.0/core"],
        "links": [
            link("self", "/", "application/json"),
            link("data", "/collections", "application/json"),
            link("search", "/search", "application/geo+json"),
        ],
    }))
    .into_response()
}

pub async fn collections_handler(State(state): State<Arc<AppState>>) -> Response {
    state.metrics.incr_mock_hits();
    Json(json!({
        "collections": &*COLLECTIONS,
        "links": [link("self", "/collections", "application/json")],
    }))
    .into_response()
}

pub async fn collection_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    state.metrics.incr_mock_hits();
    match find_collection(&id) {
        Some(collection) => Json(collection).into_response(),
        None => collection_not_found(),
    }
}

pub async fn collection_items_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    state.metrics.incr_mock_hits();
    match find_collection(&id) {
        Some(collection) => {
            let features = sample_features(collection);
            let limit = features.len();
            Json(feature_collection(features, limit)).into_response()
        }
        None => collection_not_found(),
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    /// Comma-separated collection ids; absent means all.
    pub collections: Option<String>,
    pub limit: Option<usize>,
}

pub async fn search_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Response {
    state.metrics.incr_mock_hits();

    let selected: Vec<&'static Collection> = match params.collections.as_deref() {
        Some(filter) => {
            let wanted: Vec<&str> = filter.split(',').map(str::trim).collect();
            COLLECTIONS
                .iter()
                .filter(|c| wanted.contains(&c.id.as_str()))
                .collect()
        }
        None => COLLECTIONS.iter().collect(),
    };

    let features: Vec<serde_json::Value> = selected
        .iter()
        .flat_map(|collection| sample_features(collection))
        .collect();
    let limit = params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
    Json(feature_collection(features, limit)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_has_the_three_expected_collections() {
        assert_eq!(
            collection_ids(),
            vec![
                "zee_angola_sst",
                "zee_angola_chlorophyll",
                "zee_angola_biodiversity"
            ]
        );
    }

    #[test]
    fn test_collection_documents_are_well_formed() {
        for collection in COLLECTIONS.iter() {
            assert_eq!(collection.collection_type, "Collection");
            assert_eq!(collection.stac_version, STAC_VERSION);
            assert_eq!(collection.license, "CC-BY-4.0");
            assert_eq!(collection.extent.spatial.bbox[0], ANGOLA_EEZ_BBOX.to_vec());

            let interval = &collection.extent.temporal.interval[0];
            assert_eq!(interval[0].as_deref(), Some(TEMPORAL_START));
            assert!(interval[1].is_none(), "temporal extent must be open-ended");
        }
    }

    #[test]
    fn test_find_collection() {
        assert!(find_collection("zee_angola_sst").is_some());
        assert!(find_collection("does-not-exist").is_none());
    }

    #[test]
    fn test_not_found_body_lists_available_collections() {
        let body = not_found_body();
        assert_eq!(body["error"], "Collection not found");
        assert_eq!(body["available_collections"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_sample_features_carry_collection_id() {
        let collection = find_collection("zee_angola_chlorophyll").unwrap();
        let features = sample_features(collection);

        assert_eq!(features.len(), 3);
        for feature in &features {
            assert_eq!(feature["type"], "Feature");
            assert_eq!(feature["collection"], "zee_angola_chlorophyll");
            assert_eq!(feature["geometry"]["type"], "Point");
            assert!(feature["properties"]["chla"].is_number());
        }
    }

    #[test]
    fn test_feature_collection_context_reports_truncation() {
        let collection = find_collection("zee_angola_sst").unwrap();
        let doc = feature_collection(sample_features(collection), 2);

        assert_eq!(doc["type"], "FeatureCollection");
        assert_eq!(doc["features"].as_array().unwrap().len(), 2);
        assert_eq!(doc["context"]["returned"], 2);
        assert_eq!(doc["context"]["matched"], 3);
    }
}
