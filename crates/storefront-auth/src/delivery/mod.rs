//! Delivery fee lookup: county, sub-county and location to a fee in KSh.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

const BUILTIN_TABLE: &str = include_str!("../../data/delivery_fees.toml");

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("failed to parse delivery table: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("duplicate {kind} '{name}'")]
    Duplicate { kind: &'static str, name: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    /// Fee in KSh. Zero means delivery is not offered.
    pub fee: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubCounty {
    pub name: String,
    #[serde(default)]
    pub locations: Vec<Location>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct County {
    pub name: String,
    #[serde(default, rename = "sub_county")]
    pub sub_counties: Vec<SubCounty>,
}

/// Static delivery fee table. Lookups are by exact name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryTable {
    #[serde(default, rename = "county")]
    counties: Vec<County>,
}

fn check_unique<'a>(
    kind: &'static str,
    names: impl Iterator<Item = &'a str>,
) -> Result<(), DeliveryError> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(DeliveryError::Duplicate {
                kind,
                name: name.to_string(),
            });
        }
    }
    Ok(())
}

impl DeliveryTable {
    /// The table shipped with the crate.
    pub fn builtin() -> Result<Self, DeliveryError> {
        Self::parse(BUILTIN_TABLE)
    }

    pub fn parse(source: &str) -> Result<Self, DeliveryError> {
        let table: DeliveryTable = toml::from_str(source)?;
        check_unique("county", table.counties.iter().map(|c| c.name.as_str()))?;
        for county in &table.counties {
            check_unique(
                "sub-county",
                county.sub_counties.iter().map(|s| s.name.as_str()),
            )?;
            for sub in &county.sub_counties {
                check_unique("location", sub.locations.iter().map(|l| l.name.as_str()))?;
            }
        }
        Ok(table)
    }

    fn county(&self, county: &str) -> Option<&County> {
        self.counties.iter().find(|c| c.name == county)
    }

    fn sub_county(&self, county: &str, sub_county: &str) -> Option<&SubCounty> {
        self.county(county)?
            .sub_counties
            .iter()
            .find(|s| s.name == sub_county)
    }

    pub fn counties(&self) -> Vec<&str> {
        self.counties.iter().map(|c| c.name.as_str()).collect()
    }

    /// Sub-counties of `county`, empty if the county is unknown.
    pub fn sub_counties(&self, county: &str) -> Vec<&str> {
        self.county(county)
            .map(|c| c.sub_counties.iter().map(|s| s.name.as_str()).collect())
            .unwrap_or_default()
    }

    /// Locations of a sub-county with their fees, empty if either is unknown.
    pub fn locations(&self, county: &str, sub_county: &str) -> &[Location] {
        self.sub_county(county, sub_county)
            .map(|s| s.locations.as_slice())
            .unwrap_or_default()
    }

    /// Delivery fee for a location, `None` if unknown or not delivered to.
    pub fn fee(&self, county: &str, sub_county: &str, location: &str) -> Option<u32> {
        self.locations(county, sub_county)
            .iter()
            .find(|l| l.name == location)
            .map(|l| l.fee)
            .filter(|fee| *fee > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table_loads() {
        let table = DeliveryTable::builtin().unwrap();
        assert_eq!(
            table.counties(),
            vec!["Nairobi", "Kiambu", "Kajiado", "Machakos", "Mombasa", "Kisumu"]
        );
        assert!(table.sub_counties("Nairobi").contains(&"Westlands"));
    }

    #[test]
    fn test_fee_lookup() {
        let table = DeliveryTable::builtin().unwrap();
        assert_eq!(table.fee("Nairobi", "Westlands", "Karura"), Some(200));
        assert_eq!(table.fee("Nairobi", "Kibra", "Sarang'ombe"), Some(180));
        assert_eq!(table.fee("Kisumu", "Kisumu Central", "Migosi"), Some(420));
    }

    #[test]
    fn test_unknown_keys() {
        let table = DeliveryTable::builtin().unwrap();
        assert!(table.sub_counties("Atlantis").is_empty());
        assert!(table.locations("Nairobi", "Atlantis").is_empty());
        assert_eq!(table.fee("Nairobi", "Westlands", "Atlantis"), None);
        assert_eq!(table.fee("nairobi", "Westlands", "Karura"), None);
    }

    #[test]
    fn test_zero_fee_is_not_delivered() {
        let table = DeliveryTable::parse(
            r#"
            [[county]]
            name = "Test"

            [[county.sub_county]]
            name = "North"
            locations = [{ name = "Far", fee = 0 }, { name = "Near", fee = 50 }]
            "#,
        )
        .unwrap();
        assert_eq!(table.fee("Test", "North", "Far"), None);
        assert_eq!(table.fee("Test", "North", "Near"), Some(50));
    }

    #[test]
    fn test_duplicate_location_rejected() {
        let err = DeliveryTable::parse(
            r#"
            [[county]]
            name = "Test"

            [[county.sub_county]]
            name = "North"
            locations = [{ name = "Far", fee = 10 }, { name = "Far", fee = 20 }]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, DeliveryError::Duplicate { kind: "location", .. }));
    }
}
