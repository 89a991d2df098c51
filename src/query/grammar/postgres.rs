//! PostgreSQL grammar

use super::{base, parse_json_path_array_keys, CompileResult, Grammar};
use crate::database::types::SqlValue;
use crate::query::expression::{Column, QueryValue};
use crate::query::registry::{
    Bindings, BindingKind, DatePart, Distinct, FulltextOptions, Lock, Registry, Row,
    UpsertUpdate,
};
use crate::query::DatabaseBackend;
use once_cell::sync::Lazy;
use regex::Regex;

static ARRAY_INDEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[(-?[0-9]+)\]$").expect("PostgresGrammar: invalid index pattern"));

const FULLTEXT_LANGUAGES: &[&str] = &[
    "simple",
    "arabic",
    "danish",
    "dutch",
    "english",
    "finnish",
    "french",
    "german",
    "hungarian",
    "indonesian",
    "irish",
    "italian",
    "lithuanian",
    "nepali",
    "norwegian",
    "portuguese",
    "romanian",
    "russian",
    "spanish",
    "swedish",
    "tamil",
    "turkish",
];

#[derive(Debug, Clone, Default)]
pub struct PostgresGrammar {
    table_prefix: String,
}

/// Quote JSON path attributes, leaving integer indexes bare
fn wrap_json_path_attributes(path: &[&str], quote: &str) -> Vec<String> {
    path.iter()
        .flat_map(|attribute| parse_json_path_array_keys(attribute))
        .map(|attribute| {
            if attribute.parse::<i64>().is_ok() {
                attribute
            } else {
                format!("{}{}{}", quote, attribute, quote)
            }
        })
        .collect()
}

impl PostgresGrammar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_prefix = prefix.into();
        self
    }

    /// `->` chain with the final `->>` swapped back, for jsonb operators
    fn wrap_json_document(&self, column: &str) -> String {
        self.wrap_str(column).replace("->>", "->")
    }

    fn compile_json_update_column(&self, key: &str, value: &QueryValue) -> String {
        let mut segments = key.split("->");
        let field = self.wrap_str(segments.next().unwrap_or_default());
        let rest: Vec<&str> = segments.collect();
        let path = format!("'{{{}}}'", wrap_json_path_attributes(&rest, "\"").join(","));
        format!(
            "{} = jsonb_set({}::jsonb, {}, {})",
            field,
            field,
            path,
            self.parameter(value)
        )
    }
}

impl Grammar for PostgresGrammar {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::Postgres
    }

    fn table_prefix(&self) -> &str {
        &self.table_prefix
    }

    fn returns_inserted_id(&self) -> bool {
        true
    }

    fn wrap_json_selector(&self, value: &str) -> String {
        let mut path = value.split("->");
        let field_segments: Vec<&str> = path.next().unwrap_or_default().split('.').collect();
        let field = self.wrap_segments(&field_segments);
        let rest: Vec<&str> = path.collect();

        let mut wrapped = wrap_json_path_attributes(&rest, "'");
        let Some(attribute) = wrapped.pop() else {
            return field;
        };
        if wrapped.is_empty() {
            format!("{}->>{}", field, attribute)
        } else {
            format!("{}->{}->>{}", field, wrapped.join("->"), attribute)
        }
    }

    fn compile_columns(&self, query: &Registry) -> String {
        if let Distinct::On(columns) = &query.distinct {
            return format!(
                "select distinct on ({}) {}",
                self.columnize(columns),
                base::columns_or_star(self, query)
            );
        }
        base::compile_columns(self, query)
    }

    fn compile_where_basic(&self, column: &Column, operator: &str, value: &QueryValue) -> String {
        if operator.to_lowercase().contains("like") {
            return format!(
                "{}::text {} {}",
                self.wrap(column),
                operator,
                self.parameter(value)
            );
        }
        base::compile_where_basic(self, column, operator, value)
    }

    fn compile_where_like(
        &self,
        column: &Column,
        value: &QueryValue,
        case_sensitive: bool,
        not: bool,
    ) -> CompileResult {
        let operator = format!(
            "{}{}",
            if not { "not " } else { "" },
            if case_sensitive { "like" } else { "ilike" }
        );
        Ok(self.compile_where_basic(column, &operator, value))
    }

    fn compile_date_based_where(
        &self,
        part: DatePart,
        column: &Column,
        operator: &str,
        value: &QueryValue,
    ) -> String {
        let wrapped = match column {
            Column::Name(name) if self.is_json_selector(name) => format!("({})", self.wrap(column)),
            _ => self.wrap(column),
        };
        let value = self.parameter(value);
        match part {
            DatePart::Date => format!("{}::date {} {}", wrapped, operator, value),
            DatePart::Time => format!("{}::time {} {}", wrapped, operator, value),
            _ => format!(
                "extract({} from {}) {} {}",
                part.as_str(),
                self.wrap(column),
                operator,
                value
            ),
        }
    }

    fn compile_json_contains(&self, column: &str, value: &str) -> CompileResult {
        Ok(format!("({})::jsonb @> {}", self.wrap_json_document(column), value))
    }

    fn compile_json_contains_key(&self, column: &str) -> CompileResult {
        let mut segments: Vec<String> = column.split("->").map(str::to_string).collect();
        let last = segments.pop().unwrap_or_default();

        let mut index: Option<i64> = last.parse::<i64>().ok();
        if index.is_none() {
            if let Some(captures) = ARRAY_INDEX.captures(&last) {
                let start = captures.get(0).map(|m| m.start()).unwrap_or(last.len());
                segments.push(last[..start].to_string());
                index = captures.get(1).and_then(|m| m.as_str().parse().ok());
            }
        }

        let document = self.wrap_json_document(&segments.join("->"));
        match index {
            Some(i) => {
                let length = if i < 0 { i.abs() } else { i + 1 };
                Ok(format!(
                    "case when jsonb_typeof(({d})::jsonb) = 'array' then jsonb_array_length(({d})::jsonb) >= {n} else false end",
                    d = document,
                    n = length
                ))
            }
            None => Ok(format!(
                "coalesce(({})::jsonb ?? {}, false)",
                document,
                self.quote_string(&last)
            )),
        }
    }

    fn compile_json_length(&self, column: &str, operator: &str, value: &str) -> CompileResult {
        Ok(format!(
            "jsonb_array_length(({})::jsonb) {} {}",
            self.wrap_json_document(column),
            operator,
            value
        ))
    }

    fn compile_where_fulltext(&self, columns: &[Column], options: &FulltextOptions) -> CompileResult {
        let language = options
            .language
            .as_deref()
            .filter(|language| FULLTEXT_LANGUAGES.contains(language))
            .unwrap_or("english");
        let columns = columns
            .iter()
            .map(|column| format!("to_tsvector('{}', {})", language, self.wrap(column)))
            .collect::<Vec<_>>()
            .join(" || ");
        let mode = match options.mode.as_deref() {
            Some("phrase") => "phraseto_tsquery",
            Some("websearch") => "websearch_to_tsquery",
            _ => "plainto_tsquery",
        };
        Ok(format!("({}) @@ {}('{}', ?)", columns, mode, language))
    }

    fn compile_lock(&self, _query: &Registry, lock: &Lock) -> String {
        match lock {
            Lock::Exclusive => "for update".to_string(),
            Lock::Shared => "for share".to_string(),
            Lock::Raw(sql) => sql.clone(),
        }
    }

    fn compile_insert_or_ignore(&self, query: &Registry, rows: &[Row]) -> CompileResult {
        Ok(format!("{} on conflict do nothing", self.compile_insert(query, rows)?))
    }

    fn compile_insert_or_ignore_using(
        &self,
        query: &Registry,
        columns: &[String],
        sql: &str,
    ) -> CompileResult {
        Ok(format!(
            "{} on conflict do nothing",
            self.compile_insert_using(query, columns, sql)?
        ))
    }

    fn compile_insert_get_id(
        &self,
        query: &Registry,
        rows: &[Row],
        sequence: Option<&str>,
    ) -> CompileResult {
        Ok(format!(
            "{} returning {}",
            self.compile_insert(query, rows)?,
            self.wrap_str(sequence.unwrap_or("id"))
        ))
    }

    fn compile_upsert(
        &self,
        query: &Registry,
        rows: &[Row],
        unique_by: &[String],
        update: &[UpsertUpdate],
    ) -> CompileResult {
        let sql = format!(
            "{} on conflict ({}) do update set ",
            self.compile_insert(query, rows)?,
            self.columnize_names(unique_by)
        );
        let columns = update
            .iter()
            .map(|item| match item {
                UpsertUpdate::Column(column) => format!(
                    "{} = {}.{}",
                    self.wrap_str(column),
                    self.wrap_value("excluded"),
                    self.wrap_str(column)
                ),
                UpsertUpdate::Assign(column, value) => {
                    format!("{} = {}", self.wrap_str(column), self.parameter(value))
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        Ok(sql + &columns)
    }

    fn compile_update(&self, query: &Registry, values: &Row) -> CompileResult {
        if !query.joins.is_empty() || query.limit.is_some() {
            return base::compile_update_by_key(self, query, values, "ctid");
        }
        base::compile_update(self, query, values)
    }

    fn compile_update_columns(&self, _query: &Registry, values: &Row) -> String {
        values
            .iter()
            .map(|(key, value)| {
                let column = key.rsplit('.').next().unwrap_or(key);
                if self.is_json_selector(key) {
                    self.compile_json_update_column(column, value)
                } else {
                    format!("{} = {}", self.wrap_str(column), self.parameter(value))
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Set values first; JSON targets are bound as documents
    fn prepare_bindings_for_update(&self, bindings: &Bindings, values: &Row) -> Vec<SqlValue> {
        let mut out = Vec::new();
        for (column, value) in values {
            match value {
                QueryValue::Expr(_) => {}
                QueryValue::Param(value @ (SqlValue::Json(_) | SqlValue::Array(_))) => {
                    out.push(SqlValue::Json(value.to_json()))
                }
                QueryValue::Param(value) if self.is_json_selector(column) => {
                    out.push(SqlValue::Json(value.to_json()))
                }
                QueryValue::Param(value) => out.push(value.clone()),
            }
        }
        out.extend(bindings.flatten_except(&[BindingKind::Select]));
        out
    }

    fn compile_delete(&self, query: &Registry) -> CompileResult {
        if !query.joins.is_empty() || query.limit.is_some() {
            return base::compile_delete_by_key(self, query, "ctid");
        }
        base::compile_delete(self, query)
    }

    fn compile_truncate(
        &self,
        query: &Registry,
    ) -> Result<Vec<(String, Vec<SqlValue>)>, crate::query::QueryError> {
        let table = self.wrap_table(super::query_table(query)?);
        Ok(vec![(
            format!("truncate {} restart identity cascade", table),
            Vec::new(),
        )])
    }

    fn escape_bool(&self, value: bool) -> String {
        value.to_string()
    }

    fn escape_binary(&self, value: &[u8]) -> String {
        format!("'\\x{}'::bytea", super::hex(value))
    }
}
