// libs/appointment-cell/src/services/catalog.rs
use std::collections::HashMap;
use std::fs;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use shared_config::AppConfig;

use crate::models::{ConsultationOffering, ConsultationType, DoctorProfile};

const BUILTIN_CATALOG: &str = include_str!("../../data/doctors.json");

/// Static doctor directory. Read-only after construction.
#[derive(Debug, Clone, Default)]
pub struct DoctorCatalog {
    doctors: HashMap<String, DoctorProfile>,
}

impl DoctorCatalog {
    pub fn new(doctors: Vec<DoctorProfile>) -> Self {
        let doctors = doctors
            .into_iter()
            .map(|doctor| (doctor.id.clone(), doctor))
            .collect();
        Self { doctors }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let doctors: Vec<DoctorProfile> = serde_json::from_str(json).context("invalid doctor catalog")?;
        Ok(Self::new(doctors))
    }

    pub fn load(path: &str) -> Result<Self> {
        let json = fs::read_to_string(path).with_context(|| format!("reading doctor catalog {}", path))?;
        Self::from_json_str(&json)
    }

    /// Catalog shipped with the crate.
    pub fn builtin() -> Self {
        match Self::from_json_str(BUILTIN_CATALOG) {
            Ok(catalog) => catalog,
            Err(e) => {
                error!("Built-in doctor catalog is unreadable: {:#}", e);
                Self::default()
            }
        }
    }

    /// `DOCTOR_CATALOG_PATH` when set and readable, the built-in catalog
    /// otherwise.
    pub fn from_config(config: &AppConfig) -> Self {
        let Some(path) = config.doctor_catalog_path.as_deref() else {
            return Self::builtin();
        };

        match Self::load(path) {
            Ok(catalog) => {
                info!("Loaded {} doctors from {}", catalog.len(), path);
                catalog
            }
            Err(e) => {
                warn!("Falling back to built-in doctor catalog: {:#}", e);
                Self::builtin()
            }
        }
    }

    pub fn get(&self, doctor_id: &str) -> Option<&DoctorProfile> {
        self.doctors.get(doctor_id)
    }

    pub fn offering(&self, doctor_id: &str, modality: ConsultationType) -> Option<&ConsultationOffering> {
        self.get(doctor_id)?.offering(modality)
    }

    pub fn len(&self) -> usize {
        self.doctors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doctors.is_empty()
    }
}
