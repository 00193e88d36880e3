//! Medication registry loaded from `medications.toml`.
//!
//! Each `[[medication]]` table describes one medication and its active
//! schedule:
//!
//! ```toml
//! [[medication]]
//! id = "vitamin_d"
//! name = "Vitamin D"
//! start_date = "2024-03-01"
//!
//! [medication.schedule]
//! kind = "fixed_daily_times"
//! times = ["09:00:00"]
//! weekdays = ["Mon", "Thu"]
//! ```

use crate::{Error, Medication, Result, ScheduleDefinition};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// A medication together with its (optional) active schedule
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MedicationEntry {
    #[serde(flatten)]
    pub medication: Medication,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<ScheduleDefinition>,
}

impl MedicationEntry {
    /// Whether `day` lies inside the medication's validity window
    pub fn is_valid_on(&self, day: NaiveDate) -> bool {
        let med = &self.medication;
        day >= med.start_date && med.end_date.map_or(true, |end| day <= end)
    }
}

/// All medications known to the tool
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct Registry {
    #[serde(default, rename = "medication")]
    pub medications: Vec<MedicationEntry>,
}

impl Registry {
    /// Load the registry from a TOML file
    ///
    /// Returns an empty registry if the file doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!("No medication registry at {:?}, starting empty", path);
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let registry: Registry = toml::from_str(&contents)?;
        registry.validate()?;

        tracing::debug!(
            "Loaded {} medications from {:?}",
            registry.medications.len(),
            path
        );
        Ok(registry)
    }

    /// Check identities are present and unique
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for entry in &self.medications {
            let id = entry.medication.id.trim();
            if id.is_empty() {
                return Err(Error::Registry(format!(
                    "Medication '{}' has an empty id",
                    entry.medication.name
                )));
            }
            if !seen.insert(id) {
                return Err(Error::Registry(format!("Duplicate medication id '{}'", id)));
            }
        }
        Ok(())
    }

    /// Look up a medication by id
    pub fn find(&self, id: &str) -> Result<&MedicationEntry> {
        self.medications
            .iter()
            .find(|entry| entry.medication.id == id)
            .ok_or_else(|| Error::NotFound(format!("No medication with id '{}'", id)))
    }

    /// Medications that have a schedule, optionally narrowed to one id
    pub fn scheduled<'a>(
        &'a self,
        only: Option<&'a str>,
    ) -> impl Iterator<Item = (&'a Medication, &'a ScheduleDefinition)> + 'a {
        self.medications
            .iter()
            .filter(move |entry| only.map_or(true, |id| entry.medication.id == id))
            .filter_map(|entry| {
                entry
                    .schedule
                    .as_ref()
                    .map(|schedule| (&entry.medication, schedule))
            })
    }
}
