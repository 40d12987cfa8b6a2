use itertools::Itertools;

/// Row predicate in PostgREST's `column=op.value` vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Eq(String, String),
    Neq(String, String),
    Gt(String, String),
    Gte(String, String),
    Lt(String, String),
    Lte(String, String),
    IsNull(String),
    NotNull(String),
    In(String, Vec<String>),
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl ToString) -> Self {
        Filter::Eq(column.into(), value.to_string())
    }

    pub fn gte(column: impl Into<String>, value: impl ToString) -> Self {
        Filter::Gte(column.into(), value.to_string())
    }

    pub fn lte(column: impl Into<String>, value: impl ToString) -> Self {
        Filter::Lte(column.into(), value.to_string())
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Filter::IsNull(column.into())
    }

    pub fn in_list<I, T>(column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: ToString,
    {
        Filter::In(
            column.into(),
            values.into_iter().map(|v| v.to_string()).collect(),
        )
    }

    pub fn column(&self) -> &str {
        match self {
            Filter::Eq(c, _)
            | Filter::Neq(c, _)
            | Filter::Gt(c, _)
            | Filter::Gte(c, _)
            | Filter::Lt(c, _)
            | Filter::Lte(c, _)
            | Filter::IsNull(c)
            | Filter::NotNull(c)
            | Filter::In(c, _) => c,
        }
    }

    /// Query pair as sent on the wire; reqwest handles percent-encoding.
    pub fn to_query_pair(&self) -> (String, String) {
        let value = match self {
            Filter::Eq(_, v) => format!("eq.{v}"),
            Filter::Neq(_, v) => format!("neq.{v}"),
            Filter::Gt(_, v) => format!("gt.{v}"),
            Filter::Gte(_, v) => format!("gte.{v}"),
            Filter::Lt(_, v) => format!("lt.{v}"),
            Filter::Lte(_, v) => format!("lte.{v}"),
            Filter::IsNull(_) => "is.null".to_string(),
            Filter::NotNull(_) => "not.is.null".to_string(),
            Filter::In(_, vs) => format!("in.({})", vs.iter().map(|v| quote_list_item(v)).join(",")),
        };
        (self.column().to_string(), value)
    }
}

// Values containing list delimiters must be double-quoted inside `in.(...)`
fn quote_list_item(v: &str) -> String {
    if v.contains([',', '(', ')', '"', ' ']) {
        format!("\"{}\"", v.replace('"', "\\\""))
    } else {
        v.to_string()
    }
}
