//! Reference data (postes, créneaux): `create` inserts what is missing,
//! `clean` removes seeded rows nothing references.
use serde_json::{json, Value};
use std::collections::HashSet;
use tracing::{info, warn};

use super::report::Report;
use super::RunMode;
use crate::model::{parse_rows, Creneau, Poste};
use crate::store::{select_all, Filter, Select, Store};
use crate::util::env::Tables;

pub struct SeedPoste {
    pub nom: &'static str,
    pub couleur: &'static str,
    pub icone: &'static str,
}

pub struct SeedCreneau {
    pub libelle: &'static str,
    pub heure_debut: &'static str,
    pub heure_fin: &'static str,
}

pub const POSTES: &[SeedPoste] = &[
    SeedPoste { nom: "Cuisine chaude", couleur: "#ef4444", icone: "flame" },
    SeedPoste { nom: "Sandwichs", couleur: "#f59e0b", icone: "sandwich" },
    SeedPoste { nom: "Pain", couleur: "#eab308", icone: "wheat" },
    SeedPoste { nom: "Jus de fruits", couleur: "#22c55e", icone: "citrus" },
    SeedPoste { nom: "Vaisselle", couleur: "#3b82f6", icone: "droplets" },
    SeedPoste { nom: "Légumerie", couleur: "#10b981", icone: "carrot" },
    SeedPoste { nom: "Self Midi", couleur: "#8b5cf6", icone: "utensils" },
    SeedPoste { nom: "Pâtisserie", couleur: "#ec4899", icone: "cake" },
];

pub const CRENEAUX: &[SeedCreneau] = &[
    SeedCreneau { libelle: "8h-10h", heure_debut: "08:00", heure_fin: "10:00" },
    SeedCreneau { libelle: "10h-12h", heure_debut: "10:00", heure_fin: "12:00" },
    SeedCreneau { libelle: "11h-11h45", heure_debut: "11:00", heure_fin: "11:45" },
    SeedCreneau { libelle: "11h45-12h45", heure_debut: "11:45", heure_fin: "12:45" },
    SeedCreneau { libelle: "12h-14h", heure_debut: "12:00", heure_fin: "14:00" },
    SeedCreneau { libelle: "14h-16h", heure_debut: "14:00", heure_fin: "16:00" },
];

fn poste_rows(missing: &HashSet<&str>) -> Vec<Value> {
    POSTES
        .iter()
        .enumerate()
        .filter(|(_, p)| missing.contains(p.nom))
        .map(|(i, p)| json!({"nom": p.nom, "couleur": p.couleur, "icone": p.icone, "ordre": i + 1, "actif": true}))
        .collect()
}

fn creneau_rows(missing: &HashSet<&str>) -> Vec<Value> {
    CRENEAUX
        .iter()
        .enumerate()
        .filter(|(_, c)| missing.contains(c.libelle))
        .map(|(i, c)| {
            json!({"libelle": c.libelle, "heure_debut": c.heure_debut, "heure_fin": c.heure_fin, "ordre": i + 1, "actif": true})
        })
        .collect()
}

async fn insert_missing(
    store: &dyn Store,
    report: &mut Report,
    table: &str,
    existing: HashSet<String>,
    wanted: &[&'static str],
    rows: impl Fn(&HashSet<&str>) -> Vec<Value>,
    mode: RunMode,
) {
    let missing: HashSet<&str> = wanted
        .iter()
        .copied()
        .filter(|n| !existing.contains(*n))
        .collect();
    if missing.is_empty() {
        report.ok(format!("{table}: all {} reference rows present", wanted.len()));
        return;
    }
    let rows = rows(&missing);
    if mode.is_dry_run() {
        report.info(format!("{table}: would insert {} rows", rows.len()));
        return;
    }
    match store.insert(table, &rows).await {
        Ok(inserted) => {
            info!(table, inserted = inserted.len(), "seeded");
            report.ok(format!("{table}: inserted {} rows", inserted.len()));
        }
        Err(e) => report.fail(format!("{table}: insert failed: {}", e.detail())),
    }
}

/// Insert missing reference postes and créneaux (matched by name).
pub async fn create(store: &dyn Store, tables: &Tables, mode: RunMode) -> Report {
    let mut report = Report::new("seed create");

    match select_all(store, &Select::from(tables.postes.as_str())).await {
        Ok(rows) => {
            let existing = parse_rows::<Poste>(rows)
                .rows
                .into_iter()
                .map(|p| p.nom)
                .collect();
            let wanted: Vec<&'static str> = POSTES.iter().map(|p| p.nom).collect();
            insert_missing(store, &mut report, &tables.postes, existing, &wanted, poste_rows, mode)
                .await;
        }
        Err(e) => report.fail(format!("{}: {}", tables.postes, e.detail())),
    }

    match select_all(store, &Select::from(tables.creneaux.as_str())).await {
        Ok(rows) => {
            let existing = parse_rows::<Creneau>(rows)
                .rows
                .into_iter()
                .map(|c| c.libelle)
                .collect();
            let wanted: Vec<&'static str> = CRENEAUX.iter().map(|c| c.libelle).collect();
            insert_missing(store, &mut report, &tables.creneaux, existing, &wanted, creneau_rows, mode)
                .await;
        }
        Err(e) => report.fail(format!("{}: {}", tables.creneaux, e.detail())),
    }
    report
}

/// Remove seeded reference rows that no planning entry uses.
pub async fn clean(store: &dyn Store, tables: &Tables, mode: RunMode) -> Report {
    let mut report = Report::new("seed clean");

    let postes = Select::from(tables.postes.as_str())
        .filter(Filter::in_list("nom", POSTES.iter().map(|p| p.nom)));
    match select_all(store, &postes).await {
        Ok(rows) => {
            for p in parse_rows::<Poste>(rows).rows {
                let used = store
                    .count(&tables.planning, &[Filter::eq("poste_id", &p.id)])
                    .await;
                remove_if_unused(store, &mut report, &tables.postes, &p.id.to_string(), &p.nom, used, mode)
                    .await;
            }
        }
        Err(e) => report.fail(format!("{}: {}", tables.postes, e.detail())),
    }

    let creneaux = Select::from(tables.creneaux.as_str())
        .filter(Filter::in_list("libelle", CRENEAUX.iter().map(|c| c.libelle)));
    match select_all(store, &creneaux).await {
        Ok(rows) => {
            for c in parse_rows::<Creneau>(rows).rows {
                let used = store
                    .count(&tables.planning, &[Filter::eq("creneau", &c.libelle)])
                    .await;
                remove_if_unused(store, &mut report, &tables.creneaux, &c.id.to_string(), &c.libelle, used, mode)
                    .await;
            }
        }
        Err(e) => report.fail(format!("{}: {}", tables.creneaux, e.detail())),
    }

    if mode.is_dry_run() && report.lines.iter().any(|l| l.text.contains("would delete")) {
        report.info("dry run: rerun with --execute to delete");
    }
    report
}

async fn remove_if_unused(
    store: &dyn Store,
    report: &mut Report,
    table: &str,
    id: &str,
    name: &str,
    used: Result<u64, crate::store::StoreError>,
    mode: RunMode,
) {
    match used {
        Ok(0) => {}
        Ok(n) => {
            report.info(format!("{table}: keep {name:?} ({n} planning entries)"));
            return;
        }
        Err(e) => {
            // Unknown usage: never delete on a failed check
            warn!(table, id, error = %e, "usage check failed");
            report.fail(format!("{table}: usage check for {name:?} failed: {}", e.detail()));
            return;
        }
    }
    if mode.is_dry_run() {
        report.info(format!("{table}: would delete {name:?} (id={id})"));
        return;
    }
    match store.delete(table, &[Filter::eq("id", id)]).await {
        Ok(_) => report.ok(format!("{table}: deleted {name:?}")),
        Err(e) => report.fail(format!("{table}: delete {name:?} failed: {}", e.detail())),
    }
}
