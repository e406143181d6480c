//! Static reference data: which hospitals serve which location, plus the
//! catalogs a submission form offers. Nothing here is fetched from storage.

use url::form_urlencoded;
use uuid::Uuid;

use crate::{
    domain::HospitalId,
    protocol::{CatalogEntry, DirectorySnapshot, HospitalSummary, LocationSummary},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hospital {
    pub id: HospitalId,
    pub name: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct Location {
    pub name: &'static str,
    pub hospitals: &'static [Hospital],
}

pub static LOCATIONS: &[Location] = &[Location {
    name: "Banashankari",
    hospitals: &[
        Hospital {
            id: HospitalId(Uuid::from_u128(0x550e8400_e29b_41d4_a716_446655440000)),
            name: "Sagar Hospitals",
        },
        Hospital {
            id: HospitalId(Uuid::from_u128(0x550e8400_e29b_41d4_a716_446655440001)),
            name: "Fortis Hospital",
        },
    ],
}];

pub static INCIDENT_TYPES: &[(&str, &str)] = &[
    ("accident", "Accident"),
    ("fire", "Fire"),
    ("natural_disaster", "Natural Disaster"),
    ("medical", "Medical Emergency"),
];

pub static CONSCIOUSNESS_STATES: &[(&str, &str)] = &[
    ("conscious", "Conscious"),
    ("semi_conscious", "Semi-Conscious"),
    ("unconscious", "Unconscious"),
];

pub fn hospitals_for(location: &str) -> Option<&'static [Hospital]> {
    LOCATIONS
        .iter()
        .find(|candidate| candidate.name == location)
        .map(|candidate| candidate.hospitals)
}

/// Resolves a hospital selection (id or exact display name) within the
/// hospitals serving `location`. Preserves directory order on lookup.
pub fn find_hospital(location: &str, selection: &str) -> Option<&'static Hospital> {
    let selection = selection.trim();
    hospitals_for(location)?.iter().find(|hospital| {
        hospital.name == selection || hospital.id.0.to_string().eq_ignore_ascii_case(selection)
    })
}

pub fn maps_link(hospital_name: &str, location: &str) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("api", "1")
        .append_pair("query", &format!("{hospital_name}, {location}"))
        .finish();
    format!("https://www.google.com/maps/search/?{query}")
}

fn catalog(entries: &[(&str, &str)]) -> Vec<CatalogEntry> {
    entries
        .iter()
        .map(|(id, label)| CatalogEntry {
            id: id.to_string(),
            label: label.to_string(),
        })
        .collect()
}

pub fn snapshot() -> DirectorySnapshot {
    DirectorySnapshot {
        locations: LOCATIONS
            .iter()
            .map(|location| LocationSummary {
                name: location.name.to_string(),
                hospitals: location
                    .hospitals
                    .iter()
                    .map(|hospital| HospitalSummary {
                        hospital_id: hospital.id,
                        name: hospital.name.to_string(),
                    })
                    .collect(),
            })
            .collect(),
        incident_types: catalog(INCIDENT_TYPES),
        consciousness_states: catalog(CONSCIOUSNESS_STATES),
    }
}
