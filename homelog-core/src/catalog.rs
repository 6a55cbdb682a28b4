//! Measurement Type Catalog
//!
//! The catalog is the closed set of measurement types the system knows how to
//! record. Ingestion only ever references catalog entries; a name that does not
//! resolve is a [`ParseError::UnknownMeasurement`], never a new entry.
//!
//! | Type | Storage name | Topic suffix | Unit |
//! |------|--------------|--------------|------|
//! | Temperature | `temperature` | `Temperature` | celsius |
//! | Humidity | `humidity` | `Humidity` | percent |
//! | Pressure | `pressure` | `Pressure` | hectopascal |
//!
//! Names are matched case-insensitively, so `Temperature` on an MQTT topic and
//! `temperature` in a JSON body resolve to the same type.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::ParseError;

/// One kind of measurement a sensor can report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasurementType {
    /// Air temperature
    Temperature,
    /// Relative humidity
    Humidity,
    /// Barometric pressure
    Pressure,
}

impl MeasurementType {
    /// Every catalog type, in catalog order
    pub const ALL: [MeasurementType; 3] = [
        MeasurementType::Temperature,
        MeasurementType::Humidity,
        MeasurementType::Pressure,
    ];

    /// Storage and JSON name
    pub const fn name(&self) -> &'static str {
        match self {
            MeasurementType::Temperature => "temperature",
            MeasurementType::Humidity => "humidity",
            MeasurementType::Pressure => "pressure",
        }
    }

    /// Capitalised name used as the last topic segment
    pub const fn topic_name(&self) -> &'static str {
        match self {
            MeasurementType::Temperature => "Temperature",
            MeasurementType::Humidity => "Humidity",
            MeasurementType::Pressure => "Pressure",
        }
    }

    /// Unit the value is recorded in
    pub const fn unit(&self) -> &'static str {
        match self {
            MeasurementType::Temperature => "celsius",
            MeasurementType::Humidity => "percent",
            MeasurementType::Pressure => "hectopascal",
        }
    }
}

impl fmt::Display for MeasurementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MeasurementType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        MeasurementType::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| ParseError::UnknownMeasurement(trimmed.to_string()))
    }
}

/// Catalog row as persisted by the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Measurement name (primary key)
    pub name: MeasurementType,
    /// Unit of the recorded values
    pub unit: String,
}

impl From<MeasurementType> for CatalogEntry {
    fn from(name: MeasurementType) -> Self {
        Self {
            name,
            unit: name.unit().to_string(),
        }
    }
}

/// The set of valid measurement types with their units
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::from_entries(MeasurementType::ALL.into_iter().map(CatalogEntry::from))
    }
}

impl Catalog {
    /// Build a catalog from rows, keeping the first row for each type
    pub fn from_entries(entries: impl IntoIterator<Item = CatalogEntry>) -> Self {
        let mut unique: Vec<CatalogEntry> = Vec::new();
        for entry in entries {
            if !unique.iter().any(|e| e.name == entry.name) {
                unique.push(entry);
            }
        }
        unique.sort_by_key(|e| e.name);
        Self { entries: unique }
    }

    /// Whether the type is present
    pub fn contains(&self, measurement: MeasurementType) -> bool {
        self.entries.iter().any(|e| e.name == measurement)
    }

    /// Unit recorded for the type, if catalogued
    pub fn unit(&self, measurement: MeasurementType) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.name == measurement)
            .map(|e| e.unit.as_str())
    }

    /// Resolve a name against this catalog
    pub fn resolve(&self, name: &str) -> Result<MeasurementType, ParseError> {
        let measurement: MeasurementType = name.parse()?;
        if self.contains(measurement) {
            Ok(measurement)
        } else {
            Err(ParseError::UnknownMeasurement(name.trim().to_string()))
        }
    }

    /// Catalog types in order
    pub fn types(&self) -> impl Iterator<Item = MeasurementType> + '_ {
        self.entries.iter().map(|e| e.name)
    }

    /// Catalog rows in order
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Number of types
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalog has no types
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_resolve_case_insensitively() {
        assert_eq!("Temperature".parse::<MeasurementType>(), Ok(MeasurementType::Temperature));
        assert_eq!("humidity".parse::<MeasurementType>(), Ok(MeasurementType::Humidity));
        assert_eq!(" PRESSURE ".parse::<MeasurementType>(), Ok(MeasurementType::Pressure));
    }

    #[test]
    fn unknown_name_is_parse_error() {
        assert_eq!(
            "voc".parse::<MeasurementType>(),
            Err(ParseError::UnknownMeasurement("voc".into()))
        );
    }

    #[test]
    fn default_catalog_has_units() {
        let catalog = Catalog::default();
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.unit(MeasurementType::Temperature), Some("celsius"));
        assert_eq!(catalog.unit(MeasurementType::Humidity), Some("percent"));
        assert_eq!(catalog.unit(MeasurementType::Pressure), Some("hectopascal"));
    }

    #[test]
    fn restricted_catalog_rejects_missing_type() {
        let catalog = Catalog::from_entries([CatalogEntry::from(MeasurementType::Temperature)]);
        assert!(catalog.resolve("temperature").is_ok());
        assert_eq!(
            catalog.resolve("pressure"),
            Err(ParseError::UnknownMeasurement("pressure".into()))
        );
    }

    #[test]
    fn duplicate_rows_collapse() {
        let catalog = Catalog::from_entries([
            CatalogEntry::from(MeasurementType::Humidity),
            CatalogEntry { name: MeasurementType::Humidity, unit: "ratio".into() },
            CatalogEntry::from(MeasurementType::Temperature),
        ]);
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.unit(MeasurementType::Humidity), Some("percent"));
        let order: Vec<_> = catalog.types().collect();
        assert_eq!(order, vec![MeasurementType::Temperature, MeasurementType::Humidity]);
    }

    #[test]
    fn serialises_lowercase() {
        let json = serde_json::to_string(&CatalogEntry::from(MeasurementType::Pressure)).unwrap();
        assert_eq!(json, r#"{"name":"pressure","unit":"hectopascal"}"#);
    }
}
