use anyhow::{Context, Result};
use log::{info, warn};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

use super::reviews::ReviewService;
use crate::domain::{CatalogCourse, CourseIdentity, Degree};
use crate::errors::ReviewResult;

/// One course row of the higher-education census export
#[derive(Debug, Deserialize)]
struct CensusRecord {
    #[serde(rename = "NO_IES")]
    university: String,
    #[serde(rename = "NO_CURSO")]
    course: String,
    #[serde(rename = "TP_GRAU_ACADEMICO", default)]
    degree: Option<Value>,
    #[serde(rename = "NO_CINE_AREA_GERAL", default)]
    area: Option<Value>,
    #[serde(rename = "SG_UF_IES", default)]
    region: Option<Value>,
    #[serde(rename = "NO_MUNICIPIO_IES", default)]
    campus: Option<Value>,
    #[serde(rename = "IN_GRATUITO", default)]
    free: Option<Value>,
    #[serde(rename = "CO_CURSO", default)]
    code: Option<Value>,
}

impl CensusRecord {
    fn into_catalog_course(self) -> ReviewResult<CatalogCourse> {
        let degree = self.degree.as_ref().and_then(value_text).and_then(|d| Degree::parse(&d));

        Ok(CatalogCourse {
            identity: CourseIdentity::new(&self.university, &self.course, degree)?,
            region: self.region.as_ref().and_then(value_text).map(|r| r.to_uppercase()),
            area: self.area.as_ref().and_then(value_text),
            campus: self.campus.as_ref().and_then(value_text),
            is_free: self
                .free
                .as_ref()
                .and_then(value_text)
                .is_some_and(|flag| parse_free_flag(&flag)),
            external_code: self.code.as_ref().and_then(value_text),
        })
    }
}

/// Census fields arrive as strings or numbers depending on the exporter
fn value_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Interpret the census "free of charge" flag
pub fn parse_free_flag(flag: &str) -> bool {
    matches!(
        flag.trim().to_lowercase().as_str(),
        "1" | "s" | "sim" | "y" | "yes" | "true" | "publica" | "pública" | "gratuito" | "gratuita"
    )
}

/// Parse a census JSON export. Rows without a usable university or course
/// name are skipped with a warning.
pub fn parse_catalog(json: &str) -> Result<Vec<CatalogCourse>> {
    let records: Vec<CensusRecord> =
        serde_json::from_str(json).context("Failed to parse course catalog JSON")?;
    let total = records.len();

    let courses: Vec<_> = records
        .into_iter()
        .enumerate()
        .filter_map(|(idx, record)| match record.into_catalog_course() {
            Ok(course) => Some(course),
            Err(e) => {
                warn!("Skipping catalog row {}: {}", idx + 1, e);
                None
            }
        })
        .collect();

    if courses.len() < total {
        warn!("Skipped {} of {} catalog rows", total - courses.len(), total);
    }
    Ok(courses)
}

pub fn load_catalog(path: &Path) -> Result<Vec<CatalogCourse>> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read course catalog {}", path.display()))?;
    parse_catalog(&json)
}

/// Load a census export and upsert every course into the catalog
pub async fn import_catalog(service: &ReviewService, path: &Path) -> Result<usize> {
    let catalog = load_catalog(path)?;
    info!("Importing {} catalog courses from {}", catalog.len(), path.display());

    let imported = service.import_courses(catalog).await?;
    info!("Catalog import finished: {} courses", imported);
    Ok(imported)
}
