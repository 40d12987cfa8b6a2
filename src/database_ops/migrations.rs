//! Named DDL sets for the scheduling tables.
use std::fmt;
use std::str::FromStr;

use super::schema::Statement;
use crate::util::env::Tables;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationSet {
    /// Postes, créneaux and planning entries (+ natural-key index, session column).
    Planning,
    /// Absence table with its date-range CHECK.
    Absences,
    /// Row-level security enablement and access policies.
    Rls,
}

impl MigrationSet {
    pub const ALL: [MigrationSet; 3] = [
        MigrationSet::Planning,
        MigrationSet::Absences,
        MigrationSet::Rls,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            MigrationSet::Planning => "planning",
            MigrationSet::Absences => "absences",
            MigrationSet::Rls => "rls",
        }
    }

    /// Set whose DDL creates `table`, if any.
    pub fn creating(t: &Tables, table: &str) -> Option<MigrationSet> {
        if [&t.planning, &t.postes, &t.creneaux].iter().any(|n| n.as_str() == table) {
            Some(MigrationSet::Planning)
        } else if t.absences == table {
            Some(MigrationSet::Absences)
        } else {
            None
        }
    }

    pub fn statements(&self, t: &Tables) -> Vec<Statement> {
        match self {
            MigrationSet::Planning => planning(t),
            MigrationSet::Absences => absences(t),
            MigrationSet::Rls => rls(t),
        }
    }
}

impl fmt::Display for MigrationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MigrationSet {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown migration set {s:?} (expected planning|absences|rls)"))
    }
}

fn planning(t: &Tables) -> Vec<Statement> {
    let (postes, creneaux, planning, employees) =
        (&t.postes, &t.creneaux, &t.planning, &t.employees);
    vec![
        Statement::new(
            format!("create {postes}"),
            format!(
                "CREATE TABLE IF NOT EXISTS public.{postes} (\n\
                 \x20 id bigserial PRIMARY KEY,\n\
                 \x20 nom text NOT NULL UNIQUE,\n\
                 \x20 couleur text,\n\
                 \x20 icone text,\n\
                 \x20 ordre integer NOT NULL DEFAULT 0,\n\
                 \x20 actif boolean NOT NULL DEFAULT true,\n\
                 \x20 created_at timestamptz NOT NULL DEFAULT now()\n)"
            ),
        )
        .unless_exists(postes.as_str()),
        Statement::new(
            format!("create {creneaux}"),
            format!(
                "CREATE TABLE IF NOT EXISTS public.{creneaux} (\n\
                 \x20 id bigserial PRIMARY KEY,\n\
                 \x20 libelle text NOT NULL UNIQUE,\n\
                 \x20 heure_debut time,\n\
                 \x20 heure_fin time,\n\
                 \x20 ordre integer NOT NULL DEFAULT 0,\n\
                 \x20 actif boolean NOT NULL DEFAULT true,\n\
                 \x20 created_at timestamptz NOT NULL DEFAULT now()\n)"
            ),
        )
        .unless_exists(creneaux.as_str()),
        Statement::new(
            format!("create {planning}"),
            format!(
                "CREATE TABLE IF NOT EXISTS public.{planning} (\n\
                 \x20 id bigserial PRIMARY KEY,\n\
                 \x20 employee_id uuid NOT NULL REFERENCES public.{employees}(id) ON DELETE CASCADE,\n\
                 \x20 poste_id bigint NOT NULL REFERENCES public.{postes}(id),\n\
                 \x20 creneau text NOT NULL,\n\
                 \x20 date date NOT NULL,\n\
                 \x20 session text CHECK (session IN ('matin', 'apres-midi')),\n\
                 \x20 created_at timestamptz NOT NULL DEFAULT now()\n)"
            ),
        )
        .unless_exists(planning.as_str()),
        // Older deployments created the planning table before `session` existed
        Statement::new(
            format!("add {planning}.session"),
            format!(
                "ALTER TABLE public.{planning} ADD COLUMN IF NOT EXISTS session text \
                 CHECK (session IN ('matin', 'apres-midi'))"
            ),
        ),
        Statement::new(
            format!("index {planning}(date)"),
            format!("CREATE INDEX IF NOT EXISTS {planning}_date_idx ON public.{planning} (date)"),
        ),
        // Fails while duplicates remain; run `dedupe --execute` first
        Statement::new(
            format!("unique {planning} slot"),
            format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS {planning}_slot_uq \
                 ON public.{planning} (employee_id, poste_id, creneau, date)"
            ),
        ),
    ]
}

fn absences(t: &Tables) -> Vec<Statement> {
    let (absences, employees) = (&t.absences, &t.employees);
    vec![
        Statement::new(
            format!("create {absences}"),
            format!(
                "CREATE TABLE IF NOT EXISTS public.{absences} (\n\
                 \x20 id bigserial PRIMARY KEY,\n\
                 \x20 employee_id uuid NOT NULL REFERENCES public.{employees}(id) ON DELETE CASCADE,\n\
                 \x20 date_debut date NOT NULL,\n\
                 \x20 date_fin date NOT NULL,\n\
                 \x20 type_absence text NOT NULL,\n\
                 \x20 statut text NOT NULL,\n\
                 \x20 motif text,\n\
                 \x20 remplacant_id uuid REFERENCES public.{employees}(id),\n\
                 \x20 created_by uuid,\n\
                 \x20 created_at timestamptz NOT NULL DEFAULT now(),\n\
                 \x20 updated_at timestamptz NOT NULL DEFAULT now(),\n\
                 \x20 CONSTRAINT {absences}_dates_chk CHECK (date_fin >= date_debut)\n)"
            ),
        )
        .unless_exists(absences.as_str()),
        Statement::new(
            format!("index {absences}(employee_id)"),
            format!(
                "CREATE INDEX IF NOT EXISTS {absences}_employee_idx ON public.{absences} (employee_id)"
            ),
        ),
        Statement::new(
            format!("index {absences}(date range)"),
            format!(
                "CREATE INDEX IF NOT EXISTS {absences}_dates_idx \
                 ON public.{absences} (date_debut, date_fin)"
            ),
        ),
    ]
}

fn rls(t: &Tables) -> Vec<Statement> {
    let mut out = Vec::new();
    for table in [&t.planning, &t.absences, &t.postes, &t.creneaux] {
        out.push(Statement::new(
            format!("enable rls {table}"),
            format!("ALTER TABLE public.{table} ENABLE ROW LEVEL SECURITY"),
        ));
        out.push(Statement::new(
            format!("policy {table} read"),
            format!(
                "DROP POLICY IF EXISTS {table}_read ON public.{table};\n\
                 CREATE POLICY {table}_read ON public.{table}\n\
                 \x20 FOR SELECT TO authenticated, anon USING (true)"
            ),
        ));
        out.push(Statement::new(
            format!("policy {table} write"),
            format!(
                "DROP POLICY IF EXISTS {table}_write ON public.{table};\n\
                 CREATE POLICY {table}_write ON public.{table}\n\
                 \x20 FOR ALL TO authenticated USING (true) WITH CHECK (true)"
            ),
        ));
    }
    out
}
