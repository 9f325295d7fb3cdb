//! Provider directory lookup and agent registry construction.
//!
//! The directory is an external collaborator; this module owns only the
//! orchestration-relevant parts: the lookup seam ([`ProviderDirectory`]),
//! service-category normalization, and registry construction (agent-count
//! cap, id uniqueness).

use std::collections::HashSet;
use std::path::Path;

use callswarm_core::{ProviderAgent, ProviderRecord};
use serde::Deserialize;

use crate::errors::RegistryError;

/// Provider lookup seam.
pub trait ProviderDirectory: Send + Sync {
    /// Providers matching a service category, at most `max_count`.
    fn providers_for(&self, service_type: &str, max_count: usize) -> Vec<ProviderRecord>;
}

/// Map UI/request category names onto directory service types.
pub fn normalize_service_type(raw: &str) -> String {
    let lowered = raw.trim().to_ascii_lowercase();
    match lowered.as_str() {
        "" => "dentist".to_string(),
        "haircut" | "hair" => "salon".to_string(),
        "auto" | "car" => "auto_repair".to_string(),
        other => other.to_string(),
    }
}

/// Build the ordered agent set for one run.
///
/// Enforces the agent-count cap and id uniqueness (first occurrence
/// wins); every agent starts in `searching`.
pub fn build_agents(records: &[ProviderRecord], max_count: usize) -> Vec<ProviderAgent> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter(|r| seen.insert(r.id.clone()))
        .take(max_count)
        .map(ProviderAgent::from_record)
        .collect()
}

#[derive(Deserialize)]
struct DirectoryFile {
    #[serde(default)]
    providers: Vec<ProviderRecord>,
}

/// Directory backed by a `provider_directory.json` file.
pub struct JsonDirectory {
    providers: Vec<ProviderRecord>,
}

impl JsonDirectory {
    /// Load from a JSON file of shape `{"providers": [...]}`.
    pub fn from_path(path: &Path) -> Result<Self, RegistryError> {
        let raw = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: DirectoryFile =
            serde_json::from_str(&raw).map_err(|source| RegistryError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::from_records(file.providers))
    }

    /// Build directly from records (tests, compiled-in sets).
    pub fn from_records(providers: Vec<ProviderRecord>) -> Self {
        Self { providers }
    }
}

impl ProviderDirectory for JsonDirectory {
    fn providers_for(&self, service_type: &str, max_count: usize) -> Vec<ProviderRecord> {
        let wanted = normalize_service_type(service_type);
        self.providers
            .iter()
            .filter(|p| p.service_type.eq_ignore_ascii_case(&wanted))
            .take(max_count)
            .cloned()
            .collect()
    }
}

/// Compiled-in fallback directory used when no file is configured.
pub struct StaticDirectory;

impl StaticDirectory {
    fn records() -> Vec<ProviderRecord> {
        let names = [
            ("prov-1", "Bayview Dental", true),
            ("prov-2", "Mission Smiles", false),
            ("prov-3", "Sunset Orthodontics", false),
            ("prov-4", "Marina Family Dental", false),
            ("prov-5", "Pacific Heights Dental", false),
        ];
        names
            .into_iter()
            .map(|(id, name, live)| ProviderRecord {
                id: id.to_string(),
                name: name.to_string(),
                service_type: "dentist".to_string(),
                live_channel_ready: live,
                rating: None,
                distance_miles: None,
            })
            .collect()
    }
}

impl ProviderDirectory for StaticDirectory {
    fn providers_for(&self, service_type: &str, max_count: usize) -> Vec<ProviderRecord> {
        let wanted = normalize_service_type(service_type);
        Self::records()
            .into_iter()
            .filter(|p| p.service_type == wanted)
            .take(max_count)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn record(id: &str, service_type: &str) -> ProviderRecord {
        ProviderRecord {
            id: id.to_string(),
            name: format!("Provider {id}"),
            service_type: service_type.to_string(),
            live_channel_ready: false,
            rating: None,
            distance_miles: None,
        }
    }

    #[test]
    fn normalize_maps_aliases() {
        assert_eq!(normalize_service_type("haircut"), "salon");
        assert_eq!(normalize_service_type("hair"), "salon");
        assert_eq!(normalize_service_type("auto"), "auto_repair");
        assert_eq!(normalize_service_type("car"), "auto_repair");
    }

    #[test]
    fn normalize_passes_through_unknown() {
        assert_eq!(normalize_service_type("Dentist"), "dentist");
        assert_eq!(normalize_service_type("therapist"), "therapist");
    }

    #[test]
    fn normalize_empty_defaults_to_dentist() {
        assert_eq!(normalize_service_type(""), "dentist");
        assert_eq!(normalize_service_type("   "), "dentist");
    }

    #[test]
    fn build_agents_caps_count() {
        let records: Vec<_> = (0..10).map(|i| record(&format!("p{i}"), "dentist")).collect();
        let agents = build_agents(&records, 3);
        assert_eq!(agents.len(), 3);
        assert_eq!(agents[0].id, "p0");
        assert_eq!(agents[2].id, "p2");
    }

    #[test]
    fn build_agents_dedupes_ids_first_wins() {
        let mut dup = record("p1", "dentist");
        dup.name = "Duplicate".to_string();
        let records = vec![record("p1", "dentist"), dup, record("p2", "dentist")];
        let agents = build_agents(&records, 10);
        assert_eq!(agents.len(), 2);
        assert_eq!(agents[0].name, "Provider p1");
    }

    #[test]
    fn json_directory_filters_by_service_type() {
        let dir = JsonDirectory::from_records(vec![
            record("d1", "dentist"),
            record("s1", "salon"),
            record("d2", "dentist"),
        ]);
        let dentists = dir.providers_for("dentist", 10);
        assert_eq!(dentists.len(), 2);
        let salons = dir.providers_for("haircut", 10);
        assert_eq!(salons.len(), 1);
        assert_eq!(salons[0].id, "s1");
    }

    #[test]
    fn json_directory_respects_max() {
        let dir = JsonDirectory::from_records(vec![
            record("d1", "dentist"),
            record("d2", "dentist"),
            record("d3", "dentist"),
        ]);
        assert_eq!(dir.providers_for("dentist", 2).len(), 2);
    }

    #[test]
    fn json_directory_loads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("providers.json");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(
            br#"{"providers": [
                {"id": "d1", "name": "Smile Co", "serviceType": "dentist", "liveChannelReady": true},
                {"id": "v1", "name": "Paws Vet", "serviceType": "vet"}
            ]}"#,
        )
        .unwrap();

        let loaded = JsonDirectory::from_path(&path).unwrap();
        let dentists = loaded.providers_for("dentist", 10);
        assert_eq!(dentists.len(), 1);
        assert!(dentists[0].live_channel_ready);
    }

    #[test]
    fn json_directory_bad_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("providers.json");
        std::fs::write(&path, "nonsense").unwrap();
        assert!(matches!(
            JsonDirectory::from_path(&path),
            Err(RegistryError::Parse { .. })
        ));
    }

    #[test]
    fn static_directory_serves_dentists() {
        let providers = StaticDirectory.providers_for("dentist", 15);
        assert_eq!(providers.len(), 5);
        // Unique ids
        let ids: HashSet<_> = providers.iter().map(|p| p.id.clone()).collect();
        assert_eq!(ids.len(), 5);
    }

    #[test]
    fn static_directory_empty_for_other_categories() {
        assert!(StaticDirectory.providers_for("plumber", 15).is_empty());
    }
}
