use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

use super::domain::{CategoryType, ServiceRecord, ServiceStatus};
use super::onboarding::{ServiceDraft, ServiceFactoryRegistry};

#[derive(Debug)]
pub enum CatalogError {
    Io(std::io::Error),
    Csv(csv::Error),
    Row { line: u64, reason: String },
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::Io(err) => write!(f, "failed to read service catalog: {}", err),
            CatalogError::Csv(err) => write!(f, "invalid service catalog CSV: {}", err),
            CatalogError::Row { line, reason } => {
                write!(f, "catalog line {}: {}", line, reason)
            }
        }
    }
}

impl std::error::Error for CatalogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CatalogError::Io(err) => Some(err),
            CatalogError::Csv(err) => Some(err),
            CatalogError::Row { .. } => None,
        }
    }
}

impl From<std::io::Error> for CatalogError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for CatalogError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

/// Seeds service records from a CSV export, one row per listing.
pub struct CatalogImporter {
    factories: ServiceFactoryRegistry,
}

impl CatalogImporter {
    pub fn new(factories: ServiceFactoryRegistry) -> Self {
        Self { factories }
    }

    pub fn from_path<P: AsRef<Path>>(
        &self,
        path: P,
        now: DateTime<Utc>,
    ) -> Result<Vec<ServiceRecord>, CatalogError> {
        let file = std::fs::File::open(path)?;
        self.from_reader(file, now)
    }

    pub fn from_reader<R: Read>(
        &self,
        reader: R,
        now: DateTime<Utc>,
    ) -> Result<Vec<ServiceRecord>, CatalogError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut records = Vec::new();

        let headers = csv_reader.headers()?.clone();

        for raw in csv_reader.records() {
            let raw = raw?;
            let line = raw.position().map_or(0, |position| position.line());
            let row: CatalogRow =
                raw.deserialize(Some(&headers))
                    .map_err(|err| CatalogError::Row {
                        line,
                        reason: err.to_string(),
                    })?;
            let draft = row
                .into_draft()
                .map_err(|reason| CatalogError::Row { line, reason })?;
            let record = self
                .factories
                .build(None, draft, now)
                .map_err(|err| CatalogError::Row {
                    line,
                    reason: err.to_string(),
                })?;
            records.push(record);
        }

        tracing::info!(records = records.len(), "service catalog imported");
        Ok(records)
    }
}

impl Default for CatalogImporter {
    fn default() -> Self {
        Self::new(ServiceFactoryRegistry::with_defaults())
    }
}

#[derive(Debug, Deserialize)]
struct CatalogRow {
    name: String,
    #[serde(default)]
    description: String,
    category: String,
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    address: String,
    #[serde(default)]
    city: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    tags: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    max_capacity: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    current_capacity: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    status: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    emergency: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    verified: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    quality_score: Option<String>,
}

impl CatalogRow {
    fn into_draft(self) -> Result<ServiceDraft, String> {
        let category = CategoryType::from_str(&self.category).map_err(|err| err.to_string())?;
        let status = self
            .status
            .as_deref()
            .map(ServiceStatus::from_str)
            .transpose()
            .map_err(|err| err.to_string())?;

        Ok(ServiceDraft {
            category: Some(category),
            latitude: Some(self.latitude),
            longitude: Some(self.longitude),
            tags: self
                .tags
                .as_deref()
                .map(|raw| raw.split(';').map(str::to_string).collect())
                .unwrap_or_default(),
            max_capacity: parse_optional("max_capacity", self.max_capacity.as_deref())?,
            current_capacity: parse_optional("current_capacity", self.current_capacity.as_deref())?,
            status,
            is_emergency_service: parse_flag("emergency", self.emergency.as_deref())?,
            is_verified: parse_flag("verified", self.verified.as_deref())?,
            quality_score: parse_optional("quality_score", self.quality_score.as_deref())?,
            name: self.name,
            description: self.description,
            address: self.address,
            city: self.city,
            ..ServiceDraft::default()
        })
    }
}

fn parse_optional<T: FromStr>(field: &str, raw: Option<&str>) -> Result<Option<T>, String> {
    raw.map(|value| {
        value
            .parse::<T>()
            .map_err(|_| format!("{field} is not a valid number ('{value}')"))
    })
    .transpose()
}

fn parse_flag(field: &str, raw: Option<&str>) -> Result<Option<bool>, String> {
    match raw.map(|value| value.to_ascii_lowercase()) {
        None => Ok(None),
        Some(value) => match value.as_str() {
            "1" | "true" | "yes" | "y" => Ok(Some(true)),
            "0" | "false" | "no" | "n" => Ok(Some(false)),
            _ => Err(format!("{field} must be true/false ('{value}')")),
        },
    }
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const CATALOG: &str = "\
name,description,category,latitude,longitude,address,city,tags,max_capacity,current_capacity,status,emergency,verified,quality_score
Harbor Shelter,Overnight beds,shelter,3.1390,101.6869,12 Jalan Pantai,Kuala Lumpur,beds;overnight,,12,open,,yes,4.2
City Trauma Unit,24h trauma care,emergency,3.1450,101.6900,1 Jalan Hospital,Kuala Lumpur,,,,,,,
Green Pantry , Weekly groceries ,food,3.1400,101.6880,4 Jalan Pasar,Kuala Lumpur,Groceries,40,10,closed,no,true,
";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0)
            .single()
            .expect("valid date")
    }

    #[test]
    fn imports_rows_through_category_factories() {
        let records = CatalogImporter::default()
            .from_reader(CATALOG.as_bytes(), now())
            .expect("catalog parses");
        assert_eq!(records.len(), 3);

        let shelter = &records[0];
        assert_eq!(shelter.category, CategoryType::Shelter);
        assert_eq!(shelter.max_capacity, Some(50));
        assert_eq!(shelter.current_capacity, 12);
        assert!(shelter.is_emergency_service);
        assert!(shelter.is_verified);
        assert!(shelter.tags.contains(&"overnight".to_string()));
        assert!(shelter.tags.contains(&"housing".to_string()));

        let trauma = &records[1];
        assert!(trauma.is_emergency_service);
        assert!(trauma.is_verified);
        assert_eq!(trauma.status, ServiceStatus::Open);

        let pantry = &records[2];
        assert_eq!(pantry.name, "Green Pantry");
        assert_eq!(pantry.description, "Weekly groceries");
        assert_eq!(pantry.status, ServiceStatus::Closed);
        assert!(!pantry.is_emergency_service);
        assert_eq!(pantry.max_capacity, Some(40));
        assert!(pantry.search_blob.contains("groceries"));
    }

    #[test]
    fn bad_rows_report_their_line() {
        let csv = "\
name,description,category,latitude,longitude,address,city
Good,Fine,food,3.1,101.6,1 Road,KL
Bad,Broken,spaceport,3.1,101.6,2 Road,KL
";
        match CatalogImporter::default().from_reader(csv.as_bytes(), now()) {
            Err(CatalogError::Row { line, reason }) => {
                assert_eq!(line, 3);
                assert!(reason.contains("spaceport"));
            }
            other => panic!("expected row error, got {other:?}"),
        }
    }

    #[test]
    fn invalid_values_are_rejected() {
        for row in [
            "X,Y,food,3.1,101.6,1 Road,KL,,0,,,,,",
            "X,Y,food,3.1,101.6,1 Road,KL,,,,full,,,",
            "X,Y,food,91.0,101.6,1 Road,KL,,,,,,,",
            "X,Y,food,3.1,101.6,1 Road,KL,,,,,maybe,,",
            "X,Y,food,3.1,101.6,1 Road,KL,,ten,,,,,",
        ] {
            let csv = format!(
                "name,description,category,latitude,longitude,address,city,tags,max_capacity,current_capacity,status,emergency,verified,quality_score\n{row}\n"
            );
            assert!(
                matches!(
                    CatalogImporter::default().from_reader(csv.as_bytes(), now()),
                    Err(CatalogError::Row { line: 2, .. })
                ),
                "row should be rejected: {row}"
            );
        }
    }

    #[test]
    fn missing_file_is_io_error() {
        match CatalogImporter::default().from_path("/nonexistent/services.csv", now()) {
            Err(CatalogError::Io(_)) => {}
            other => panic!("expected io error, got {other:?}"),
        }
    }
}
