//! Statement classification and gating.
//!
//! Every raw SQL string passes through [`gate`] before it may reach the
//! database. Classification happens in two layers:
//!
//! 1. A quote-aware scanner strips comments, rejects multi-statement input and
//!    decides the statement kind from its leading keyword. Read statements are
//!    additionally scanned for write keywords hidden in their body.
//! 2. When [sqlparser](https://docs.rs/sqlparser/) can parse the statement with
//!    the backend's dialect, the AST node type must agree with the keyword
//!    decision. Parse failures fall back to the keyword result, so the server
//!    stays the authority on syntax.
//!
//! The text that is executed is the comment-free statement produced by the
//! scanner, so what was classified is exactly what runs.

use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, OperationKind};
use sqlparser::ast::Statement;
use sqlparser::dialect::{Dialect, MySqlDialect, SQLiteDialect};
use sqlparser::parser::Parser;
use tracing::debug;

/// Result of classifying one SQL string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Allowed(OperationKind),
    Rejected(String),
}

impl Classification {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed(_))
    }
}

/// A statement that passed the gate, ready for execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatedStatement {
    pub kind: OperationKind,
    /// Leading keyword, upper-cased (e.g. "SELECT")
    pub keyword: String,
    /// Comment-free statement text without the trailing `;`
    pub sql: String,
}

/// Words that may not appear in the body of a read statement.
const FORBIDDEN_IN_READ: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "REPLACE", "DROP", "TRUNCATE", "ALTER", "CREATE", "GRANT",
    "REVOKE", "RENAME",
];

/// Words that may not appear after `ALTER TABLE <name> ADD COLUMN`.
const FORBIDDEN_IN_ADD_COLUMN: &[&str] = &["DROP", "RENAME", "TRUNCATE", "MODIFY", "CHANGE"];

/// Guidance attached to mismatch errors.
mod error_messages {
    pub const USE_QUERY: &str =
        "Use query_database for SELECT, SHOW, DESCRIBE and EXPLAIN statements.";
    pub const USE_EXECUTE: &str = "Use execute_sql for INSERT, UPDATE and DELETE statements.";
    pub const USE_SCHEMA_TOOLS: &str =
        "Use create_table or add_column for schema changes; other DDL is not available.";
    pub const MULTI_STATEMENT: &str = "multiple statements are not permitted";
    pub const EMPTY: &str = "empty statement";
}

/// Get the appropriate SQL dialect for the given database type.
fn get_dialect(db_type: DatabaseType) -> Box<dyn Dialect> {
    match db_type {
        DatabaseType::MySQL => Box::new(MySqlDialect {}),
        DatabaseType::SQLite => Box::new(SQLiteDialect {}),
    }
}

/// Classify a raw SQL string.
///
/// Pure and deterministic: the same input always yields the same result.
///
/// # Examples
///
/// ```
/// use sql_gateway_mcp::models::{DatabaseType, OperationKind};
/// use sql_gateway_mcp::tools::classifier::{classify, Classification};
///
/// assert_eq!(
///     classify("SELECT * FROM users", DatabaseType::MySQL),
///     Classification::Allowed(OperationKind::Read)
/// );
/// assert!(!classify("DROP TABLE users", DatabaseType::MySQL).is_allowed());
/// ```
pub fn classify(sql: &str, db_type: DatabaseType) -> Classification {
    match inspect(sql, db_type) {
        Ok(gated) => Classification::Allowed(gated.kind),
        Err(reason) => Classification::Rejected(reason),
    }
}

/// Classify `sql` and check it against the kind the calling tool declared.
///
/// Returns the statement to execute, `Forbidden` when the classifier rejects
/// it, or `Mismatch` when it is allowed but belongs to a different tool.
pub fn gate(
    sql: &str,
    declared: OperationKind,
    tool: &str,
    db_type: DatabaseType,
) -> DbResult<GatedStatement> {
    let gated = inspect(sql, db_type).map_err(DbError::forbidden)?;

    if gated.kind != declared {
        let suggestion = match gated.kind {
            OperationKind::Read | OperationKind::Metadata => error_messages::USE_QUERY,
            OperationKind::Write => error_messages::USE_EXECUTE,
            OperationKind::SchemaDdl => error_messages::USE_SCHEMA_TOOLS,
        };
        return Err(DbError::mismatch(
            tool,
            declared.as_str(),
            format!("{} ({})", gated.kind, gated.keyword),
            suggestion,
        ));
    }

    Ok(gated)
}

/// Run both classification layers, returning the gated statement or a reason.
pub fn inspect(sql: &str, db_type: DatabaseType) -> Result<GatedStatement, String> {
    let scanned = scan(sql, db_type)?;
    let (keyword, kind) = classify_tokens(&scanned.tokens)?;
    cross_check(&scanned.text, &keyword, kind, db_type)?;

    Ok(GatedStatement {
        kind,
        keyword,
        sql: scanned.text,
    })
}

// =============================================================================
// Scanner
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    /// Unquoted word, upper-cased
    Word(String),
    /// Quoted string or identifier
    Quoted,
    Punct(char),
}

impl Token {
    fn is_word(&self, word: &str) -> bool {
        matches!(self, Token::Word(w) if w == word)
    }
}

struct Scanned {
    text: String,
    tokens: Vec<Token>,
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Strip comments, tokenize, and enforce the single-statement rule.
fn scan(sql: &str, db_type: DatabaseType) -> Result<Scanned, String> {
    let chars: Vec<char> = sql.chars().collect();
    let backslash_escapes = db_type == DatabaseType::MySQL;

    let mut text = String::with_capacity(sql.len());
    let mut tokens = Vec::new();
    let mut word = String::new();
    let mut i = 0;

    let flush = |word: &mut String, tokens: &mut Vec<Token>| {
        if !word.is_empty() {
            tokens.push(Token::Word(word.to_uppercase()));
            word.clear();
        }
    };

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        match c {
            '\'' | '"' | '`' => {
                flush(&mut word, &mut tokens);
                let end = find_closing_quote(&chars, i, c, backslash_escapes)
                    .ok_or_else(|| "unterminated quoted text".to_string())?;
                text.extend(&chars[i..=end]);
                tokens.push(Token::Quoted);
                i = end + 1;
            }
            '-' if next == Some('-') && starts_line_comment(&chars, i, db_type) => {
                flush(&mut word, &mut tokens);
                i = skip_to_line_end(&chars, i);
                text.push(' ');
            }
            '#' => {
                flush(&mut word, &mut tokens);
                i = skip_to_line_end(&chars, i);
                text.push(' ');
            }
            '/' if next == Some('*') => {
                flush(&mut word, &mut tokens);
                i = skip_block_comment(&chars, i)
                    .ok_or_else(|| "unterminated comment".to_string())?;
                text.push(' ');
            }
            c if c.is_whitespace() => {
                flush(&mut word, &mut tokens);
                text.push(c);
                i += 1;
            }
            c if is_word_char(c) => {
                word.push(c);
                text.push(c);
                i += 1;
            }
            c => {
                flush(&mut word, &mut tokens);
                tokens.push(Token::Punct(c));
                text.push(c);
                i += 1;
            }
        }
    }
    flush(&mut word, &mut tokens);

    if let Some(pos) = tokens.iter().position(|t| *t == Token::Punct(';')) {
        if pos + 1 != tokens.len() {
            return Err(error_messages::MULTI_STATEMENT.to_string());
        }
        tokens.pop();
        let trimmed = text.trim_end();
        text = trimmed
            .strip_suffix(';')
            .unwrap_or(trimmed)
            .to_string();
    }

    if tokens.is_empty() {
        return Err(error_messages::EMPTY.to_string());
    }

    Ok(Scanned {
        text: text.trim().to_string(),
        tokens,
    })
}

fn find_closing_quote(
    chars: &[char],
    start: usize,
    quote: char,
    backslash_escapes: bool,
) -> Option<usize> {
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i];
        if backslash_escapes && c == '\\' && quote != '`' {
            i += 2;
            continue;
        }
        if c == quote {
            // Doubled quote is an escaped quote
            if chars.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return Some(i);
        }
        i += 1;
    }
    None
}

/// MySQL only treats `--` as a comment when followed by whitespace or end of input.
fn starts_line_comment(chars: &[char], i: usize, db_type: DatabaseType) -> bool {
    match db_type {
        DatabaseType::SQLite => true,
        DatabaseType::MySQL => chars.get(i + 2).is_none_or(|c| c.is_whitespace()),
    }
}

fn skip_to_line_end(chars: &[char], start: usize) -> usize {
    chars[start..]
        .iter()
        .position(|&c| c == '\n')
        .map_or(chars.len(), |p| start + p)
}

/// Returns the index just past `*/`.
fn skip_block_comment(chars: &[char], start: usize) -> Option<usize> {
    let mut i = start + 2;
    while i + 1 < chars.len() {
        if chars[i] == '*' && chars[i + 1] == '/' {
            return Some(i + 2);
        }
        i += 1;
    }
    None
}

// =============================================================================
// Keyword classification
// =============================================================================

fn classify_tokens(tokens: &[Token]) -> Result<(String, OperationKind), String> {
    // Allow parenthesized queries such as "(SELECT 1) UNION (SELECT 2)"
    let start = tokens
        .iter()
        .position(|t| *t != Token::Punct('('))
        .unwrap_or(tokens.len());

    let keyword = match tokens.get(start) {
        Some(Token::Word(w)) => w.clone(),
        _ => return Err("unrecognized statement".to_string()),
    };
    let body = &tokens[start..];

    let kind = match keyword.as_str() {
        "SELECT" | "SHOW" | "DESCRIBE" | "DESC" | "EXPLAIN" | "WITH" => {
            check_read_body(body)?;
            OperationKind::Read
        }
        "INSERT" | "UPDATE" | "DELETE" => OperationKind::Write,
        "CREATE" if body.get(1).is_some_and(|t| t.is_word("TABLE")) => OperationKind::SchemaDdl,
        "CREATE" => {
            return Err(format!(
                "operation not permitted: CREATE {}",
                word_at(body, 1).unwrap_or_default()
            ));
        }
        "ALTER" => {
            check_add_column(body)?;
            OperationKind::SchemaDdl
        }
        other => return Err(format!("operation not permitted: {}", other)),
    };

    Ok((keyword, kind))
}

fn word_at(tokens: &[Token], idx: usize) -> Option<&str> {
    match tokens.get(idx) {
        Some(Token::Word(w)) => Some(w.as_str()),
        _ => None,
    }
}

/// Reject write keywords and file exports hidden in a read statement.
fn check_read_body(tokens: &[Token]) -> Result<(), String> {
    for (idx, token) in tokens.iter().enumerate().skip(1) {
        let Token::Word(word) = token else {
            continue;
        };

        if FORBIDDEN_IN_READ.contains(&word.as_str()) {
            let allowed = match word.as_str() {
                // Locking read: SELECT ... FOR UPDATE
                "UPDATE" => idx > 0 && tokens[idx - 1].is_word("FOR"),
                // String functions INSERT(...) and REPLACE(...)
                "INSERT" | "REPLACE" => tokens.get(idx + 1) == Some(&Token::Punct('(')),
                // SHOW CREATE TABLE
                "CREATE" => idx == 1 && tokens[0].is_word("SHOW"),
                _ => false,
            };
            if !allowed {
                return Err(format!("write keyword {} in read statement", word));
            }
        }

        if word == "INTO" {
            if let Some(target @ ("OUTFILE" | "DUMPFILE")) = word_at(tokens, idx + 1) {
                return Err(format!("INTO {} is not permitted", target));
            }
        }
    }
    Ok(())
}

/// Accept only `ALTER TABLE <name> ADD COLUMN ...` with a single action.
fn check_add_column(tokens: &[Token]) -> Result<(), String> {
    const NOT_PERMITTED: &str = "operation not permitted: ALTER (only ADD COLUMN is allowed)";

    if !tokens.get(1).is_some_and(|t| t.is_word("TABLE")) {
        return Err(NOT_PERMITTED.to_string());
    }

    // Table name: `name`, `schema.name`, quoted or not
    let is_name = |t: Option<&Token>| matches!(t, Some(Token::Word(_)) | Some(Token::Quoted));
    let mut idx = 2;
    if !is_name(tokens.get(idx)) {
        return Err(NOT_PERMITTED.to_string());
    }
    idx += 1;
    if tokens.get(idx) == Some(&Token::Punct('.')) {
        if !is_name(tokens.get(idx + 1)) {
            return Err(NOT_PERMITTED.to_string());
        }
        idx += 2;
    }

    if !(tokens.get(idx).is_some_and(|t| t.is_word("ADD"))
        && tokens.get(idx + 1).is_some_and(|t| t.is_word("COLUMN")))
    {
        return Err(NOT_PERMITTED.to_string());
    }

    let mut depth: i32 = 0;
    for token in &tokens[idx + 2..] {
        match token {
            Token::Punct('(') => depth += 1,
            Token::Punct(')') => depth -= 1,
            Token::Punct(',') if depth <= 0 => {
                return Err("ALTER TABLE may contain only one ADD COLUMN action".to_string());
            }
            Token::Word(w) if FORBIDDEN_IN_ADD_COLUMN.contains(&w.as_str()) => {
                return Err(format!("{} is not permitted in ADD COLUMN", w));
            }
            _ => {}
        }
    }
    Ok(())
}

// =============================================================================
// AST cross-check
// =============================================================================

fn cross_check(
    sql: &str,
    keyword: &str,
    kind: OperationKind,
    db_type: DatabaseType,
) -> Result<(), String> {
    let dialect = get_dialect(db_type);

    let statements = match Parser::parse_sql(dialect.as_ref(), sql) {
        Ok(statements) => statements,
        Err(e) => {
            debug!(error = %e, "SQL parser rejected statement, using keyword classification");
            return Ok(());
        }
    };

    if statements.len() != 1 {
        return Err(error_messages::MULTI_STATEMENT.to_string());
    }

    match statement_kind(&statements[0]) {
        Some(parsed) if parsed == kind => Ok(()),
        // SHOW never modifies anything, whatever node the parser builds for it
        None if keyword == "SHOW" && kind == OperationKind::Read => Ok(()),
        Some(parsed) => Err(format!(
            "statement parses as {} but begins like a {} statement",
            parsed, kind
        )),
        None => Err("operation not permitted: unsupported statement type".to_string()),
    }
}

/// Map a parsed statement onto the kind it would run as, if permitted at all.
fn statement_kind(stmt: &Statement) -> Option<OperationKind> {
    match stmt {
        // =====================================================================
        // Reads
        // =====================================================================
        Statement::Query(_) => Some(OperationKind::Read),
        Statement::ShowTables { .. }
        | Statement::ShowColumns { .. }
        | Statement::ShowDatabases { .. }
        | Statement::ShowSchemas { .. }
        | Statement::ShowCreate { .. }
        | Statement::ShowFunctions { .. }
        | Statement::ShowVariable { .. }
        | Statement::ShowVariables { .. }
        | Statement::ShowStatus { .. }
        | Statement::ShowCollation { .. }
        | Statement::ShowCharset(_)
        | Statement::ShowObjects(_)
        | Statement::ShowViews { .. }
        | Statement::ExplainTable { .. } => Some(OperationKind::Read),

        // EXPLAIN takes the kind of the explained statement
        Statement::Explain { statement, .. } => statement_kind(statement),

        // =====================================================================
        // Writes
        // =====================================================================
        Statement::Insert(_) | Statement::Update { .. } | Statement::Delete(_) => {
            Some(OperationKind::Write)
        }

        // =====================================================================
        // Schema DDL
        // =====================================================================
        Statement::CreateTable { .. } | Statement::AlterTable { .. } => {
            Some(OperationKind::SchemaDdl)
        }

        _ => None,
    }
}
