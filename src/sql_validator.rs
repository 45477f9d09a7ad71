//! SQL Validator
//!
//! Gate between untrusted model output and the store. A candidate passes only
//! if it is a single read-only query whose every table and column reference
//! resolves against the canonical schema or an alias/CTE it defines itself.
//! [`ValidatedStatement`] can only be built here, and the executor accepts
//! nothing else.

use crate::db::schema::{CanonicalSchema, SqlDialect};
use crate::error::AgentError;
use sqlparser::ast::{
    visit_expressions, visit_relations, Expr, ObjectName, Query, SelectItem, SetExpr, Statement, TableAlias,
    TableFactor, Visit, Visitor,
};
use sqlparser::dialect::{Dialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, Tokenizer};
use std::collections::{HashMap, HashSet};
use std::ops::ControlFlow;
use thiserror::Error;
use tracing::warn;

/// Words that never appear in a read-only query. Matched on unquoted tokens
/// only, so string literals and quoted identifiers are unaffected.
const MUTATION_KEYWORDS: &[&str] = &[
    "DROP", "DELETE", "UPDATE", "INSERT", "ALTER", "TRUNCATE", "CREATE", "GRANT", "REVOKE", "MERGE", "COPY", "CALL",
    "ATTACH", "DETACH", "EXECUTE", "PRAGMA", "VACUUM", "REINDEX",
];

/// Functions with side effects or access outside the two tables.
const DENIED_FUNCTIONS: &[&str] = &[
    "pg_sleep",
    "pg_read_file",
    "pg_read_binary_file",
    "pg_ls_dir",
    "pg_stat_file",
    "pg_terminate_backend",
    "pg_cancel_backend",
    "pg_reload_conf",
    "pg_advisory_lock",
    "lo_import",
    "lo_export",
    "dblink",
    "dblink_exec",
    "set_config",
    "nextval",
    "setval",
    "query_to_xml",
    "load_extension",
    "readfile",
    "writefile",
];

/// Schema qualifiers accepted in front of a canonical table name.
const DEFAULT_SCHEMAS: &[&str] = &["public", "main"];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0}")]
    Unsafe(String),

    #[error("{0}")]
    UnknownReference(String),
}

impl From<ValidationError> for AgentError {
    fn from(e: ValidationError) -> Self {
        match e {
            ValidationError::Unsafe(msg) => AgentError::UnsafeQuery(msg),
            ValidationError::UnknownReference(msg) => AgentError::UnknownSchemaReference(msg),
        }
    }
}

/// A statement that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedStatement {
    sql: String,
    executable: String,
}

impl ValidatedStatement {
    /// The statement as the model wrote it.
    pub fn as_str(&self) -> &str {
        &self.sql
    }

    /// The statement rendered back from its parse tree: no comments and no
    /// terminator, safe to embed as a subquery or prepare.
    pub fn executable_sql(&self) -> &str {
        &self.executable
    }
}

impl std::fmt::Display for ValidatedStatement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.sql)
    }
}

pub struct SqlValidator {
    schema: CanonicalSchema,
    dialect: SqlDialect,
}

/// What a relation name refers to.
enum Source {
    Table(String),
    Cte,
}

impl SqlValidator {
    pub fn new(schema: CanonicalSchema, dialect: SqlDialect) -> Self {
        Self { schema, dialect }
    }

    pub fn validate(&self, candidate: &str) -> Result<ValidatedStatement, ValidationError> {
        let result = self.check(candidate.trim());
        if let Err(e) = &result {
            warn!(reason = %e, sql = candidate, "rejected generated SQL");
        }
        result
    }

    fn parser_dialect(&self) -> Box<dyn Dialect> {
        match self.dialect {
            SqlDialect::Postgres => Box::new(PostgreSqlDialect {}),
            SqlDialect::Sqlite => Box::new(SQLiteDialect {}),
        }
    }

    fn check(&self, sql: &str) -> Result<ValidatedStatement, ValidationError> {
        if sql.is_empty() {
            return Err(ValidationError::Unsafe("empty statement".to_string()));
        }
        let dialect = self.parser_dialect();
        scan_tokens(dialect.as_ref(), sql)?;

        let mut statements = Parser::parse_sql(dialect.as_ref(), sql)
            .map_err(|e| ValidationError::Unsafe(format!("statement could not be parsed: {}", e)))?;
        if statements.len() != 1 {
            return Err(ValidationError::Unsafe(format!(
                "expected exactly one statement, found {}",
                statements.len()
            )));
        }
        let statement = statements.remove(0);

        let Statement::Query(query) = &statement else {
            return Err(ValidationError::Unsafe("only SELECT queries are allowed".to_string()));
        };
        let has_derived = check_sources(&statement)?;
        check_functions(&statement)?;

        let scope = Scope::collect(&statement, query, self.dialect == SqlDialect::Postgres);
        if let Some(reason) = scope.rejected {
            return Err(ValidationError::Unsafe(reason));
        }
        let tables = self.check_relations(&statement, &scope, has_derived)?;
        self.check_columns(&statement, &scope, tables.as_ref())?;

        Ok(ValidatedStatement {
            sql: sql.to_string(),
            executable: statement.to_string(),
        })
    }

    /// Resolve every relation, including `TABLE <name>` shorthands. Returns the
    /// canonical tables read, or `None` when a CTE or derived table is among
    /// the sources and column names can only be checked loosely.
    fn check_relations(
        &self,
        statement: &Statement,
        scope: &Scope,
        has_derived: bool,
    ) -> Result<Option<HashSet<String>>, ValidationError> {
        let mut tables = HashSet::new();
        let mut opaque = has_derived;
        let mut record = |parts: &[String]| match self.resolve_relation(parts, scope) {
            Some(Source::Table(name)) => {
                tables.insert(name);
                true
            }
            Some(Source::Cte) => {
                opaque = true;
                true
            }
            None => false,
        };

        let outcome = visit_relations(statement, |relation| {
            if record(lowered(relation).as_slice()) {
                ControlFlow::Continue(())
            } else {
                ControlFlow::Break(relation.to_string())
            }
        });
        if let ControlFlow::Break(name) = outcome {
            return Err(ValidationError::UnknownReference(format!("unknown table '{}'", name)));
        }
        for parts in &scope.shorthand_tables {
            if !record(parts.as_slice()) {
                return Err(ValidationError::UnknownReference(format!(
                    "unknown table '{}'",
                    parts.join(".")
                )));
            }
        }

        Ok(if opaque { None } else { Some(tables) })
    }

    fn resolve_relation(&self, parts: &[String], scope: &Scope) -> Option<Source> {
        match parts {
            [name] if self.schema.has_table(name) => Some(Source::Table(name.clone())),
            [name] if scope.ctes.contains(name) => Some(Source::Cte),
            [qualifier, name] if DEFAULT_SCHEMAS.contains(&qualifier.as_str()) && self.schema.has_table(name) => {
                Some(Source::Table(name.clone()))
            }
            _ => None,
        }
    }

    fn check_columns(
        &self,
        statement: &Statement,
        scope: &Scope,
        tables: Option<&HashSet<String>>,
    ) -> Result<(), ValidationError> {
        let outcome = visit_expressions(statement, |expr| match expr {
            Expr::Identifier(ident) => {
                let name = ident.value.to_lowercase();
                if scope.columns.contains(&name) || self.column_in_sources(&name, tables) {
                    ControlFlow::Continue(())
                } else {
                    ControlFlow::Break(format!("unknown column '{}'", ident.value))
                }
            }
            Expr::CompoundIdentifier(idents) => {
                let parts: Vec<String> = idents.iter().map(|i| i.value.to_lowercase()).collect();
                if self.resolve_qualified(&parts, scope, tables) {
                    ControlFlow::Continue(())
                } else {
                    ControlFlow::Break(format!("unknown column '{}'", parts.join(".")))
                }
            }
            _ => ControlFlow::Continue(()),
        });
        if let ControlFlow::Break(msg) = outcome {
            return Err(ValidationError::UnknownReference(msg));
        }

        for parts in &scope.wildcard_qualifiers {
            let qualifier = match parts.as_slice() {
                [qualifier] => Some(qualifier),
                [schema, qualifier] if DEFAULT_SCHEMAS.contains(&schema.as_str()) => Some(qualifier),
                _ => None,
            };
            if qualifier
                .and_then(|q| self.resolve_qualifier(q, scope, tables))
                .is_none()
            {
                return Err(ValidationError::UnknownReference(format!(
                    "unknown table in '{}.*'",
                    parts.join(".")
                )));
            }
        }
        Ok(())
    }

    /// Unqualified column lookup: against the tables actually read when they
    /// are all canonical, otherwise against the whole schema.
    fn column_in_sources(&self, column: &str, tables: Option<&HashSet<String>>) -> bool {
        match tables {
            Some(tables) => tables
                .iter()
                .filter_map(|t| self.schema.table(t))
                .any(|t| t.has_column(column)),
            None => self.schema.has_column(column),
        }
    }

    /// What a qualifier (`p` in `p.title`) stands for: `Some(Some(table))` for
    /// a named relation, `Some(None)` for a CTE or derived table, `None` when
    /// it names nothing in scope.
    fn resolve_qualifier(
        &self,
        qualifier: &str,
        scope: &Scope,
        tables: Option<&HashSet<String>>,
    ) -> Option<Option<String>> {
        if let Some(bound) = scope.table_aliases.get(qualifier) {
            return Some(bound.clone());
        }
        if self.schema.has_table(qualifier) && tables.map_or(true, |t| t.contains(qualifier)) {
            return Some(Some(qualifier.to_string()));
        }
        if scope.ctes.contains(qualifier) {
            return Some(None);
        }
        None
    }

    fn resolve_qualified(&self, parts: &[String], scope: &Scope, tables: Option<&HashSet<String>>) -> bool {
        let (qualifier, column) = match parts {
            [qualifier, column] => (qualifier, column),
            [schema, qualifier, column] if DEFAULT_SCHEMAS.contains(&schema.as_str()) => (qualifier, column),
            _ => return false,
        };

        let Some(target) = self.resolve_qualifier(qualifier, scope, tables) else {
            return false;
        };
        match target.as_deref().and_then(|t| self.schema.table(t)) {
            Some(table) => table.has_column(column),
            None => self.schema.has_column(column) || scope.columns.contains(column),
        }
    }
}

fn lowered(name: &ObjectName) -> Vec<String> {
    name.0.iter().map(|i| i.value.to_lowercase()).collect()
}

/// Token-level checks that must hold before parsing: no mutation keyword and
/// nothing after a statement terminator.
fn scan_tokens(dialect: &dyn Dialect, sql: &str) -> Result<(), ValidationError> {
    let tokens = Tokenizer::new(dialect, sql)
        .tokenize()
        .map_err(|e| ValidationError::Unsafe(format!("statement could not be tokenized: {}", e)))?;

    let mut terminated = false;
    for token in &tokens {
        match token {
            Token::Whitespace(_) | Token::EOF => {}
            Token::SemiColon if !terminated => terminated = true,
            _ if terminated => {
                return Err(ValidationError::Unsafe("multiple statements are not allowed".to_string()));
            }
            Token::Word(word) if word.quote_style.is_none() => {
                let upper = word.value.to_uppercase();
                if MUTATION_KEYWORDS.contains(&upper.as_str()) {
                    return Err(ValidationError::Unsafe(format!("{} is not allowed", upper)));
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Allows plain tables, subqueries and parenthesized joins in FROM; table
/// functions, UNNEST and PIVOT can read outside the schema.
#[derive(Default)]
struct SourceGuard {
    has_derived: bool,
}

impl Visitor for SourceGuard {
    type Break = String;

    fn pre_visit_table_factor(&mut self, factor: &TableFactor) -> ControlFlow<Self::Break> {
        match factor {
            TableFactor::Table { args: None, .. } | TableFactor::NestedJoin { .. } => ControlFlow::Continue(()),
            TableFactor::Derived { .. } => {
                self.has_derived = true;
                ControlFlow::Continue(())
            }
            TableFactor::Table { name, .. } => {
                ControlFlow::Break(format!("table function {}() is not allowed", name))
            }
            other => ControlFlow::Break(format!("'{}' is not allowed as a FROM source", other)),
        }
    }
}

/// Returns whether any source is a derived table.
fn check_sources(statement: &Statement) -> Result<bool, ValidationError> {
    let mut guard = SourceGuard::default();
    match statement.visit(&mut guard) {
        ControlFlow::Break(reason) => Err(ValidationError::Unsafe(reason)),
        ControlFlow::Continue(()) => Ok(guard.has_derived),
    }
}

fn check_functions(statement: &Statement) -> Result<(), ValidationError> {
    let outcome = visit_expressions(statement, |expr| {
        if let Expr::Function(func) = expr {
            if let Some(name) = func.name.0.last() {
                let name = name.value.to_lowercase();
                if DENIED_FUNCTIONS.contains(&name.as_str()) {
                    return ControlFlow::Break(name);
                }
            }
        }
        ControlFlow::Continue(())
    });
    match outcome {
        ControlFlow::Break(name) => Err(ValidationError::Unsafe(format!("function {}() is not allowed", name))),
        ControlFlow::Continue(()) => Ok(()),
    }
}

/// Names a statement defines for itself, collected across every nested query,
/// plus the first read-only violation found along the way.
#[derive(Debug, Default)]
struct Scope {
    ctes: HashSet<String>,
    /// Output column aliases, CTE column lists and derived-table column lists
    columns: HashSet<String>,
    /// Relation alias -> canonical table it stands for, if any
    table_aliases: HashMap<String, Option<String>>,
    /// Tables named by the `TABLE <name>` shorthand
    shorthand_tables: Vec<Vec<String>>,
    /// Qualifiers of `<qualifier>.*` projections
    wildcard_qualifiers: Vec<Vec<String>>,
    /// Postgres names unaliased aggregates after the function (`count`)
    implicit_names: bool,
    rejected: Option<String>,
}

impl Scope {
    fn collect(statement: &Statement, query: &Query, implicit_names: bool) -> Self {
        let mut scope = Scope {
            implicit_names,
            ..Scope::default()
        };
        scope.add_query(query);
        let _ = visit_expressions(statement, |expr| {
            match expr {
                Expr::Subquery(subquery)
                | Expr::ArraySubquery(subquery)
                | Expr::InSubquery { subquery, .. }
                | Expr::Exists { subquery, .. } => scope.add_query(subquery),
                _ => {}
            }
            ControlFlow::<()>::Continue(())
        });
        scope
    }

    fn reject(&mut self, reason: &str) {
        if self.rejected.is_none() {
            self.rejected = Some(reason.to_string());
        }
    }

    fn add_query(&mut self, query: &Query) {
        if !query.locks.is_empty() {
            self.reject("row locks are not allowed");
        }
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                self.ctes.insert(cte.alias.name.value.to_lowercase());
                self.add_alias_columns(&cte.alias);
                self.add_query(&cte.query);
            }
        }
        self.add_set_expr(&query.body);
    }

    fn add_set_expr(&mut self, body: &SetExpr) {
        match body {
            SetExpr::Select(select) => {
                if select.into.is_some() {
                    self.reject("SELECT ... INTO is not allowed");
                }
                for item in &select.projection {
                    match item {
                        SelectItem::ExprWithAlias { alias, .. } => {
                            self.columns.insert(alias.value.to_lowercase());
                        }
                        SelectItem::UnnamedExpr(Expr::Function(func)) if self.implicit_names => {
                            if let Some(name) = func.name.0.last() {
                                self.columns.insert(name.value.to_lowercase());
                            }
                        }
                        SelectItem::QualifiedWildcard(qualifier, _) => {
                            self.wildcard_qualifiers.push(lowered(qualifier));
                        }
                        _ => {}
                    }
                }
                for table in &select.from {
                    self.add_table_factor(&table.relation);
                    for join in &table.joins {
                        self.add_table_factor(&join.relation);
                    }
                }
            }
            SetExpr::Query(query) => self.add_query(query),
            SetExpr::SetOperation { left, right, .. } => {
                self.add_set_expr(left);
                self.add_set_expr(right);
            }
            SetExpr::Table(table) => match &table.table_name {
                Some(name) => {
                    let mut parts: Vec<String> = table.schema_name.iter().map(|s| s.to_lowercase()).collect();
                    parts.push(name.to_lowercase());
                    self.shorthand_tables.push(parts);
                }
                None => self.reject("TABLE without a table name is not allowed"),
            },
            SetExpr::Values(_) => {}
            _ => self.reject("data-modifying statements are not allowed"),
        }
    }

    fn add_table_factor(&mut self, factor: &TableFactor) {
        match factor {
            TableFactor::Table { name, alias, .. } => {
                if let Some(alias) = alias {
                    let target = name.0.last().map(|i| i.value.to_lowercase());
                    self.table_aliases.insert(alias.name.value.to_lowercase(), target);
                    self.add_alias_columns(alias);
                }
            }
            TableFactor::Derived { subquery, alias, .. } => {
                if let Some(alias) = alias {
                    self.table_aliases.insert(alias.name.value.to_lowercase(), None);
                    self.add_alias_columns(alias);
                }
                self.add_query(subquery);
            }
            TableFactor::NestedJoin {
                table_with_joins,
                alias,
            } => {
                if let Some(alias) = alias {
                    self.table_aliases.insert(alias.name.value.to_lowercase(), None);
                }
                self.add_table_factor(&table_with_joins.relation);
                for join in &table_with_joins.joins {
                    self.add_table_factor(&join.relation);
                }
            }
            _ => {}
        }
    }

    fn add_alias_columns(&mut self, alias: &TableAlias) {
        for column in &alias.columns {
            self.columns.insert(column.value.to_lowercase());
        }
    }
}
