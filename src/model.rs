//! Typed views of the rows the tooling reads. Payloads are parsed at the
//! boundary; anything that does not fit is reported, not trusted.
use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Primary/foreign key as the store hands it back: bigint or uuid/text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RowId {
    Int(i64),
    Text(String),
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowId::Int(i) => write!(f, "{i}"),
            RowId::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for RowId {
    fn from(v: i64) -> Self {
        RowId::Int(v)
    }
}

/// Half-day bucket a créneau belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Session {
    #[serde(rename = "matin")]
    Matin,
    #[serde(rename = "apres-midi", alias = "après-midi")]
    ApresMidi,
}

impl Session {
    pub fn as_str(&self) -> &'static str {
        match self {
            Session::Matin => "matin",
            Session::ApresMidi => "apres-midi",
        }
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Session {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "matin" => Ok(Session::Matin),
            "apres-midi" | "après-midi" => Ok(Session::ApresMidi),
            other => Err(format!("unknown session {other:?} (expected matin|apres-midi)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanningEntry {
    pub id: RowId,
    pub employee_id: RowId,
    pub poste_id: RowId,
    pub creneau: String,
    pub date: NaiveDate,
    /// Raw label; only the backfill interprets it as a `Session`.
    #[serde(default)]
    pub session: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Intended uniqueness key of a planning entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotKey {
    pub employee_id: RowId,
    pub poste_id: RowId,
    pub creneau: String,
    pub date: NaiveDate,
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "employee={} poste={} creneau={:?} date={}",
            self.employee_id, self.poste_id, self.creneau, self.date
        )
    }
}

impl PlanningEntry {
    pub fn slot_key(&self) -> SlotKey {
        SlotKey {
            employee_id: self.employee_id.clone(),
            poste_id: self.poste_id.clone(),
            creneau: self.creneau.trim().to_string(),
            date: self.date,
        }
    }
}

/// `type_absence` and `statut` are free labels owned by the front-end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbsenceEntry {
    pub id: RowId,
    pub employee_id: RowId,
    pub date_debut: NaiveDate,
    pub date_fin: NaiveDate,
    pub type_absence: String,
    pub statut: String,
    #[serde(default)]
    pub motif: Option<String>,
    #[serde(default)]
    pub remplacant_id: Option<RowId>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl AbsenceEntry {
    /// Problems with this row; empty when it is consistent.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.date_fin < self.date_debut {
            problems.push(format!(
                "date_fin {} is before date_debut {}",
                self.date_fin, self.date_debut
            ));
        }
        problems
    }

    pub fn covers(&self, day: NaiveDate) -> bool {
        self.date_debut <= day && day <= self.date_fin
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Poste {
    pub id: RowId,
    pub nom: String,
    #[serde(default)]
    pub couleur: Option<String>,
    #[serde(default)]
    pub icone: Option<String>,
    #[serde(default)]
    pub ordre: Option<i32>,
    #[serde(default = "default_true")]
    pub actif: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Creneau {
    pub id: RowId,
    pub libelle: String,
    #[serde(default)]
    pub heure_debut: Option<String>,
    #[serde(default)]
    pub heure_fin: Option<String>,
    #[serde(default)]
    pub ordre: Option<i32>,
    #[serde(default = "default_true")]
    pub actif: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    pub id: RowId,
    #[serde(default)]
    pub nom: Option<String>,
    #[serde(default)]
    pub prenom: Option<String>,
    #[serde(default = "default_true")]
    pub actif: bool,
}

fn default_true() -> bool {
    true
}

/// A row that failed to parse, kept for reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejected {
    pub id: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parsed<T> {
    pub rows: Vec<T>,
    pub rejected: Vec<Rejected>,
}

pub fn parse_rows<T: DeserializeOwned>(raw: Vec<Value>) -> Parsed<T> {
    let mut rows = Vec::with_capacity(raw.len());
    let mut rejected = Vec::new();
    for value in raw {
        let id = value.get("id").map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        });
        match serde_json::from_value::<T>(value) {
            Ok(row) => rows.push(row),
            Err(e) => rejected.push(Rejected {
                id,
                reason: e.to_string(),
            }),
        }
    }
    Parsed { rows, rejected }
}
