use serde::{Deserialize, Serialize};

use super::GeoPoint;

/// An aerodrome near a destination
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AirportCandidate {
    pub name: String,
    /// Three letter IATA code; commercial airports carry one
    pub iata_code: Option<String>,
    pub position: GeoPoint,
    /// Great-circle distance to the destination
    pub distance_km: f64,
}

impl AirportCandidate {
    #[must_use]
    pub fn has_iata_code(&self) -> bool {
        self.iata_code
            .as_deref()
            .is_some_and(|code| !code.trim().is_empty())
    }

    /// Name with the IATA code appended when present, e.g. `Pakyong Airport (PYG)`
    #[must_use]
    pub fn display_name(&self) -> String {
        match self.iata_code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => format!("{} ({code})", self.name),
            _ => self.name.clone(),
        }
    }
}
