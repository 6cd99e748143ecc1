//! Stack repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist stack entries as independently stored, doubly-linked records.
//! - Persist the singleton direction flag and consult it on every operation.
//! - Keep every multi-record mutation inside one SQLite transaction.
//!
//! # Invariants
//! - A committed list has zero or one entry with `left == End` and zero or
//!   one entry with `right == End`; both exist iff the list is non-empty.
//! - `Neighbor::Unset` never survives a commit.
//! - Reverse touches only the configuration row.
//! - Popped entries are hard-deleted; nothing else deletes entries.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::entry::{Direction, EntryId, Neighbor, Side, StackConfiguration, StackEntry};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const ENTRY_SELECT_SQL: &str = "SELECT
    entry_id,
    content,
    left_kind,
    left_ref,
    right_kind,
    right_ref
FROM stack_entries";

const CONFIG_ROW_ID: i64 = 1;

pub type RepoResult<T> = Result<T, RepoError>;

/// Coarse error classification exposed to callers of the stack operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller supplied an absent or malformed value. Not retryable.
    InvalidInput,
    /// Storage unavailable, write rejected, or persisted state unusable.
    PersistenceFailure,
}

/// Errors from stack repository operations.
#[derive(Debug)]
pub enum RepoError {
    /// Caller input rejected before touching storage.
    InvalidInput(&'static str),
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Required column is missing from expected table.
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Persisted row cannot be converted to a valid model.
    InvalidData(String),
    /// Persisted links do not form a single well-terminated chain.
    BrokenChain(String),
}

impl RepoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Db(_)
            | Self::UninitializedConnection { .. }
            | Self::MissingRequiredTable(_)
            | Self::MissingRequiredColumn { .. }
            | Self::InvalidData(_)
            | Self::BrokenChain(_) => ErrorKind::PersistenceFailure,
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInput(message) => write!(f, "invalid input: {message}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "stack repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "stack repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "stack repository requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted stack data: {message}"),
            Self::BrokenChain(message) => write!(f, "stack chain is broken: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::InvalidInput(_)
            | Self::UninitializedConnection { .. }
            | Self::MissingRequiredTable(_)
            | Self::MissingRequiredColumn { .. }
            | Self::InvalidData(_)
            | Self::BrokenChain(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Result of a full link walk over the persisted list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainReport {
    /// Number of entries reachable from either terminus.
    pub len: u64,
    /// Entry holding the left terminus.
    pub left_end: Option<EntryId>,
    /// Entry holding the right terminus.
    pub right_end: Option<EntryId>,
}

/// Repository interface for the persisted stack.
pub trait StackRepository {
    /// Loads the configuration row, creating the default when absent.
    fn load_configuration(&self) -> RepoResult<StackConfiguration>;
    fn push(&self, content: Option<&str>) -> RepoResult<EntryId>;
    fn pick(&self) -> RepoResult<Option<String>>;
    fn pop(&self) -> RepoResult<Option<String>>;
    /// Flips the direction flag and returns the value written, or `None` on
    /// an empty stack.
    fn reverse(&self) -> RepoResult<Option<Direction>>;
    fn entry_count(&self) -> RepoResult<u64>;
    /// Walks the chain from both termini and checks every back link.
    fn verify_chain(&self) -> RepoResult<ChainReport>;
}

/// SQLite-backed stack repository.
pub struct SqliteStackRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteStackRepository<'conn> {
    /// Wraps a migrated connection.
    ///
    /// # Errors
    /// - Returns `UninitializedConnection` when `user_version` is not latest.
    /// - Returns `MissingRequiredTable`/`MissingRequiredColumn` for a schema
    ///   that does not match the expected stack tables.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_stack_connection_ready(conn)?;
        Ok(Self { conn })
    }

    /// Wraps a connection already accepted by `try_new`.
    pub(crate) fn from_ready(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl StackRepository for SqliteStackRepository<'_> {
    fn load_configuration(&self) -> RepoResult<StackConfiguration> {
        self.conn.execute(
            "INSERT OR IGNORE INTO stack_config (config_id, direction) VALUES (?1, ?2);",
            params![CONFIG_ROW_ID, direction_to_db(Direction::default())],
        )?;
        Ok(StackConfiguration {
            direction: read_direction(self.conn)?,
        })
    }

    fn push(&self, content: Option<&str>) -> RepoResult<EntryId> {
        let content = content.ok_or(RepoError::InvalidInput("content must be provided"))?;

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let side = read_direction(&tx)?.active_side();

        let mut entry = StackEntry::new(content);
        insert_entry(&tx, &entry)?;

        match find_terminus(&tx, side)? {
            Some(previous) => {
                // Release the terminus before the new entry claims it.
                update_link(&tx, previous.id, side, Neighbor::Ref(entry.id))?;
                entry.set_link(side, Neighbor::End);
                entry.set_link(side.opposite(), Neighbor::Ref(previous.id));
            }
            None => {
                let total = count_entries(&tx)?;
                if total != 1 {
                    return Err(RepoError::BrokenChain(format!(
                        "no {} terminus among {} existing entries",
                        side_label(side),
                        total.saturating_sub(1)
                    )));
                }
                entry.left = Neighbor::End;
                entry.right = Neighbor::End;
            }
        }

        debug_assert!(entry.is_linked());
        update_link(&tx, entry.id, Side::Left, entry.left)?;
        update_link(&tx, entry.id, Side::Right, entry.right)?;
        tx.commit()?;

        Ok(entry.id)
    }

    fn pick(&self) -> RepoResult<Option<String>> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Deferred)?;
        let side = read_direction(&tx)?.active_side();
        let top = match find_terminus(&tx, side)? {
            Some(top) => Some(top.content),
            None => {
                ensure_empty(&tx, side)?;
                None
            }
        };
        tx.commit()?;
        Ok(top)
    }

    fn pop(&self) -> RepoResult<Option<String>> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let side = read_direction(&tx)?.active_side();

        let Some(top) = find_terminus(&tx, side)? else {
            ensure_empty(&tx, side)?;
            return Ok(None);
        };

        let inner = side.opposite();
        let neighbor = find_linked_to(&tx, side, top.id)?;
        match (top.link(inner), neighbor) {
            (Neighbor::End, None) => {
                delete_entry(&tx, top.id)?;
            }
            (Neighbor::Ref(expected), Some(neighbor)) if neighbor.id == expected => {
                // The popped row must go before its neighbor can hold the terminus.
                delete_entry(&tx, top.id)?;
                update_link(&tx, neighbor.id, side, Neighbor::End)?;
            }
            (link, neighbor) => {
                return Err(RepoError::BrokenChain(format!(
                    "entry {} has {} link {:?} but back link is held by {:?}",
                    top.id,
                    side_label(inner),
                    link,
                    neighbor.map(|entry| entry.id)
                )));
            }
        }

        tx.commit()?;
        Ok(Some(top.content))
    }

    fn reverse(&self) -> RepoResult<Option<Direction>> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        if count_entries(&tx)? == 0 {
            return Ok(None);
        }

        let flipped = read_direction(&tx)?.flipped();
        tx.execute(
            "INSERT INTO stack_config (config_id, direction) VALUES (?1, ?2)
             ON CONFLICT(config_id) DO UPDATE SET
                direction = excluded.direction,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![CONFIG_ROW_ID, direction_to_db(flipped)],
        )?;
        tx.commit()?;

        Ok(Some(flipped))
    }

    fn entry_count(&self) -> RepoResult<u64> {
        count_entries(self.conn)
    }

    fn verify_chain(&self) -> RepoResult<ChainReport> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Deferred)?;
        let report = verify_chain_in(&tx)?;
        tx.commit()?;
        Ok(report)
    }
}

fn verify_chain_in(conn: &Connection) -> RepoResult<ChainReport> {
    let total = count_entries(conn)?;

    let unset: i64 = conn.query_row(
        "SELECT COUNT(*) FROM stack_entries
         WHERE left_kind = 'unset' OR right_kind = 'unset';",
        [],
        |row| row.get(0),
    )?;
    if unset > 0 {
        return Err(RepoError::BrokenChain(format!(
            "{unset} entries carry unresolved links"
        )));
    }

    for side in [Side::Left, Side::Right] {
        let termini: i64 = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM stack_entries WHERE {} = 'end';",
                kind_column(side)
            ),
            [],
            |row| row.get(0),
        )?;
        let expected = i64::from(total > 0);
        if termini != expected {
            return Err(RepoError::BrokenChain(format!(
                "expected {expected} {} terminus, found {termini}",
                side_label(side)
            )));
        }
    }

    let (Some(left_end), Some(right_end)) = (
        find_terminus(conn, Side::Left)?,
        find_terminus(conn, Side::Right)?,
    ) else {
        return Ok(ChainReport {
            len: 0,
            left_end: None,
            right_end: None,
        });
    };

    for (start, toward, expected_last) in [
        (&left_end, Side::Right, right_end.id),
        (&right_end, Side::Left, left_end.id),
    ] {
        let (visited, last) = walk_chain(conn, start, toward, total)?;
        if last != expected_last || visited != total {
            return Err(RepoError::BrokenChain(format!(
                "walk toward {} visited {visited} of {total} entries and stopped at {last}",
                side_label(toward)
            )));
        }
    }

    Ok(ChainReport {
        len: total,
        left_end: Some(left_end.id),
        right_end: Some(right_end.id),
    })
}

fn walk_chain(
    conn: &Connection,
    start: &StackEntry,
    toward: Side,
    total: u64,
) -> RepoResult<(u64, EntryId)> {
    let mut visited = HashSet::new();
    let mut current = start.clone();

    loop {
        if !visited.insert(current.id) {
            return Err(RepoError::BrokenChain(format!(
                "cycle detected at entry {}",
                current.id
            )));
        }
        if visited.len() as u64 > total {
            return Err(RepoError::BrokenChain(format!(
                "walk exceeded {total} entries"
            )));
        }

        let link = current.link(toward);
        if link.is_end() {
            return Ok((visited.len() as u64, current.id));
        }
        let next_id = link.entry_id().ok_or_else(|| {
            RepoError::BrokenChain(format!(
                "entry {} has an unresolved {} link",
                current.id,
                side_label(toward)
            ))
        })?;

        let next = load_entry(conn, next_id)?.ok_or_else(|| {
            RepoError::BrokenChain(format!(
                "entry {} links to missing entry {next_id}",
                current.id
            ))
        })?;
        if next.link(toward.opposite()) != Neighbor::Ref(current.id) {
            return Err(RepoError::BrokenChain(format!(
                "entry {} does not link back to {}",
                next.id, current.id
            )));
        }
        current = next;
    }
}

fn read_direction(conn: &Connection) -> RepoResult<Direction> {
    let stored: Option<String> = conn
        .query_row(
            "SELECT direction FROM stack_config WHERE config_id = ?1;",
            [CONFIG_ROW_ID],
            |row| row.get(0),
        )
        .optional()?;

    match stored {
        Some(value) => parse_direction(&value).ok_or_else(|| {
            RepoError::InvalidData(format!(
                "invalid direction `{value}` in stack_config.direction"
            ))
        }),
        None => Ok(Direction::default()),
    }
}

fn count_entries(conn: &Connection) -> RepoResult<u64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM stack_entries;", [], |row| row.get(0))?;
    u64::try_from(count)
        .map_err(|_| RepoError::InvalidData(format!("negative entry count {count}")))
}

/// Fails when entries exist although no terminus was found on `side`.
fn ensure_empty(conn: &Connection, side: Side) -> RepoResult<()> {
    let total = count_entries(conn)?;
    if total > 0 {
        return Err(RepoError::BrokenChain(format!(
            "no {} terminus among {total} entries",
            side_label(side)
        )));
    }
    Ok(())
}

fn find_terminus(conn: &Connection, side: Side) -> RepoResult<Option<StackEntry>> {
    query_one_entry(
        conn,
        &format!("{ENTRY_SELECT_SQL} WHERE {} = 'end';", kind_column(side)),
        None,
    )
}

/// Finds the entry whose `side` link points at `id`.
fn find_linked_to(conn: &Connection, side: Side, id: EntryId) -> RepoResult<Option<StackEntry>> {
    query_one_entry(
        conn,
        &format!(
            "{ENTRY_SELECT_SQL} WHERE {} = 'ref' AND {} = ?1;",
            kind_column(side),
            ref_column(side)
        ),
        Some(id),
    )
}

fn load_entry(conn: &Connection, id: EntryId) -> RepoResult<Option<StackEntry>> {
    query_one_entry(
        conn,
        &format!("{ENTRY_SELECT_SQL} WHERE entry_id = ?1;"),
        Some(id),
    )
}

fn query_one_entry(
    conn: &Connection,
    sql: &str,
    id: Option<EntryId>,
) -> RepoResult<Option<StackEntry>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = match id {
        Some(id) => stmt.query([id.to_string()])?,
        None => stmt.query([])?,
    };
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_entry_row(row)?));
    }
    Ok(None)
}

fn insert_entry(conn: &Connection, entry: &StackEntry) -> RepoResult<()> {
    let (left_kind, left_ref) = neighbor_to_db(entry.left);
    let (right_kind, right_ref) = neighbor_to_db(entry.right);
    conn.execute(
        "INSERT INTO stack_entries (
            entry_id,
            content,
            left_kind,
            left_ref,
            right_kind,
            right_ref
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
        params![
            entry.id.to_string(),
            entry.content.as_str(),
            left_kind,
            left_ref,
            right_kind,
            right_ref,
        ],
    )?;
    Ok(())
}

fn update_link(conn: &Connection, id: EntryId, side: Side, neighbor: Neighbor) -> RepoResult<()> {
    let (kind, reference) = neighbor_to_db(neighbor);
    let changed = conn.execute(
        &format!(
            "UPDATE stack_entries SET {} = ?2, {} = ?3 WHERE entry_id = ?1;",
            kind_column(side),
            ref_column(side)
        ),
        params![id.to_string(), kind, reference],
    )?;
    if changed == 0 {
        return Err(RepoError::BrokenChain(format!(
            "cannot relink missing entry {id}"
        )));
    }
    Ok(())
}

fn delete_entry(conn: &Connection, id: EntryId) -> RepoResult<()> {
    conn.execute(
        "DELETE FROM stack_entries WHERE entry_id = ?1;",
        [id.to_string()],
    )?;
    Ok(())
}

fn parse_entry_row(row: &Row<'_>) -> RepoResult<StackEntry> {
    let id_text: String = row.get("entry_id")?;
    let id = parse_uuid(&id_text, "stack_entries.entry_id")?;

    let left = parse_neighbor(
        &row.get::<_, String>("left_kind")?,
        row.get("left_ref")?,
        "stack_entries.left_kind",
    )?;
    let right = parse_neighbor(
        &row.get::<_, String>("right_kind")?,
        row.get("right_ref")?,
        "stack_entries.right_kind",
    )?;

    Ok(StackEntry {
        id,
        content: row.get("content")?,
        left,
        right,
    })
}

fn parse_neighbor(
    kind: &str,
    reference: Option<String>,
    column: &'static str,
) -> RepoResult<Neighbor> {
    match (kind, reference) {
        ("end", None) => Ok(Neighbor::End),
        ("unset", None) => Ok(Neighbor::Unset),
        ("ref", Some(value)) => Ok(Neighbor::Ref(parse_uuid(&value, column)?)),
        (other, reference) => Err(RepoError::InvalidData(format!(
            "invalid link `{other}` with reference {reference:?} in {column}"
        ))),
    }
}

fn neighbor_to_db(neighbor: Neighbor) -> (&'static str, Option<String>) {
    match neighbor {
        Neighbor::End => ("end", None),
        Neighbor::Unset => ("unset", None),
        Neighbor::Ref(id) => ("ref", Some(id.to_string())),
    }
}

fn parse_uuid(value: &str, column: &'static str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

fn direction_to_db(direction: Direction) -> &'static str {
    match direction {
        Direction::Forward => "forward",
        Direction::Reversed => "reversed",
    }
}

fn parse_direction(value: &str) -> Option<Direction> {
    match value {
        "forward" => Some(Direction::Forward),
        "reversed" => Some(Direction::Reversed),
        _ => None,
    }
}

fn kind_column(side: Side) -> &'static str {
    match side {
        Side::Left => "left_kind",
        Side::Right => "right_kind",
    }
}

fn ref_column(side: Side) -> &'static str {
    match side {
        Side::Left => "left_ref",
        Side::Right => "right_ref",
    }
}

fn side_label(side: Side) -> &'static str {
    match side {
        Side::Left => "left",
        Side::Right => "right",
    }
}

fn ensure_stack_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    let required: [(&'static str, &[&'static str]); 2] = [
        (
            "stack_entries",
            &[
                "entry_id",
                "content",
                "left_kind",
                "left_ref",
                "right_kind",
                "right_ref",
            ],
        ),
        ("stack_config", &["config_id", "direction"]),
    ];

    for (table, columns) in required {
        if !table_exists(conn, table)? {
            return Err(RepoError::MissingRequiredTable(table));
        }
        for &column in columns {
            if !table_has_column(conn, table, column)? {
                return Err(RepoError::MissingRequiredColumn { table, column });
            }
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> RepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}
