//! Event repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide CRUD APIs over the `events` table.
//! - Compile [`EventQuery`] scope chains into SQL.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - Write paths call `Event::validate()` before SQL mutations, except
//!   `update_coordinates`, which only touches the coordinate pair.
//! - Read paths reject invalid persisted state instead of masking it.
//! - A scope step that follows a `LIMIT` runs in an outer sub-select, so
//!   the SQL result always matches `EventQuery::apply`.

use crate::db::migrations::{current_version, latest_version};
use crate::db::DbError;
use crate::model::event::{Event, EventId, EventValidationError, Recurrence};
use crate::scope::{EventQuery, ScopeStep, SortOrder};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const EVENTS_TABLE: &str = "events";
const EVENT_COLUMNS: &str =
    "uuid, title, event_date, location, description, description_html, recurrence, lat, lng";
const REQUIRED_COLUMNS: &[&str] = &[
    "uuid",
    "title",
    "event_date",
    "location",
    "description",
    "description_html",
    "recurrence",
    "lat",
    "lng",
    "updated_at",
];

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for event persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(EventValidationError),
    Db(DbError),
    NotFound(EventId),
    InvalidData(String),
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "event not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted event data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "connection schema version {actual_version} does not match expected {expected_version}; open it with open_db"
            ),
            Self::MissingRequiredTable(table) => write!(f, "required table `{table}` is missing"),
            Self::MissingRequiredColumn { table, column } => {
                write!(f, "required column `{table}.{column}` is missing")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<EventValidationError> for RepoError {
    fn from(value: EventValidationError) -> Self {
        Self::Validation(value)
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

/// Repository interface for event persistence.
pub trait EventRepository {
    /// Inserts a validated event and returns its id.
    fn create_event(&self, event: &Event) -> RepoResult<EventId>;
    /// Replaces every column of an existing event.
    fn update_event(&self, event: &Event) -> RepoResult<()>;
    /// Writes only the coordinate pair; no validation, no other columns.
    fn update_coordinates(&self, id: EventId, coordinates: Option<(f64, f64)>)
        -> RepoResult<()>;
    fn get_event(&self, id: EventId) -> RepoResult<Option<Event>>;
    fn event_exists(&self, id: EventId) -> RepoResult<bool>;
    fn delete_event(&self, id: EventId) -> RepoResult<()>;
    /// Runs a scope chain.
    fn query_events(&self, query: &EventQuery) -> RepoResult<Vec<Event>>;
}

/// SQLite-backed event repository.
pub struct SqliteEventRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteEventRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    ///
    /// # Errors
    /// - `UninitializedConnection` when the schema version is not current.
    /// - `MissingRequiredTable` / `MissingRequiredColumn` when the schema
    ///   does not have the expected shape.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl EventRepository for SqliteEventRepository<'_> {
    fn create_event(&self, event: &Event) -> RepoResult<EventId> {
        event.validate()?;
        let date = required_date(event)?;
        let coordinates = event.lat_lng_pair();

        self.conn.execute(
            "INSERT INTO events (
                uuid,
                title,
                event_date,
                location,
                description,
                description_html,
                recurrence,
                lat,
                lng
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);",
            params![
                event.id.to_string(),
                event.title.as_str(),
                date,
                event.location.as_str(),
                event.description.as_deref(),
                event.description_html(),
                event.recurrence.as_str(),
                coordinates.map(|pair| pair[0]),
                coordinates.map(|pair| pair[1]),
            ],
        )?;

        Ok(event.id)
    }

    fn update_event(&self, event: &Event) -> RepoResult<()> {
        event.validate()?;
        let date = required_date(event)?;
        let coordinates = event.lat_lng_pair();

        let changed = self.conn.execute(
            "UPDATE events
             SET
                title = ?1,
                event_date = ?2,
                location = ?3,
                description = ?4,
                description_html = ?5,
                recurrence = ?6,
                lat = ?7,
                lng = ?8,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?9;",
            params![
                event.title.as_str(),
                date,
                event.location.as_str(),
                event.description.as_deref(),
                event.description_html(),
                event.recurrence.as_str(),
                coordinates.map(|pair| pair[0]),
                coordinates.map(|pair| pair[1]),
                event.id.to_string(),
            ],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(event.id));
        }

        Ok(())
    }

    fn update_coordinates(
        &self,
        id: EventId,
        coordinates: Option<(f64, f64)>,
    ) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE events
             SET
                lat = ?2,
                lng = ?3,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?1;",
            params![
                id.to_string(),
                coordinates.map(|(lat, _)| lat),
                coordinates.map(|(_, lng)| lng),
            ],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }

        Ok(())
    }

    fn get_event(&self, id: EventId) -> RepoResult<Option<Event>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {EVENT_COLUMNS} FROM events WHERE uuid = ?1;"))?;

        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_event_row(row)?));
        }

        Ok(None)
    }

    fn event_exists(&self, id: EventId) -> RepoResult<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM events WHERE uuid = ?1;",
                [id.to_string()],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn delete_event(&self, id: EventId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM events WHERE uuid = ?1;", [id.to_string()])?;

        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }

        Ok(())
    }

    fn query_events(&self, query: &EventQuery) -> RepoResult<Vec<Event>> {
        let (sql, bind_values) = compile_query(query);
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut events = Vec::new();

        while let Some(row) = rows.next()? {
            events.push(parse_event_row(row)?);
        }

        Ok(events)
    }
}

/// Compiles a scope chain into one SELECT statement plus its bind values.
///
/// Placeholders are positional and appear in the same order as the steps
/// that produced them.
pub(crate) fn compile_query(query: &EventQuery) -> (String, Vec<Value>) {
    let mut from = EVENTS_TABLE.to_string();
    let mut filters: Vec<&'static str> = Vec::new();
    let mut order: Option<SortOrder> = None;
    let mut limited = false;
    let mut depth = 0;
    let mut bind_values = Vec::new();

    for step in query.steps() {
        if limited {
            depth += 1;
            from = format!(
                "({}) AS scope_{depth}",
                render_select(&from, &filters, order, limited)
            );
            filters.clear();
            limited = false;
        }

        match *step {
            ScopeStep::After(now) => {
                filters.push("event_date > ?");
                bind_values.push(Value::Integer(now));
            }
            ScopeStep::AtOrBefore(now) => {
                filters.push("event_date <= ?");
                bind_values.push(Value::Integer(now));
            }
            ScopeStep::Category(recurrence) => {
                filters.push("recurrence = ?");
                bind_values.push(Value::Text(recurrence.as_str().to_string()));
            }
            ScopeStep::OrderByDate(next_order) => order = Some(next_order),
            ScopeStep::Limit(limit) => {
                limited = true;
                bind_values.push(Value::Integer(i64::from(limit)));
            }
        }
    }

    (render_select(&from, &filters, order, limited), bind_values)
}

fn render_select(from: &str, filters: &[&str], order: Option<SortOrder>, limited: bool) -> String {
    let mut sql = format!("SELECT {EVENT_COLUMNS} FROM {from}");
    if !filters.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&filters.join(" AND "));
    }
    match order {
        Some(SortOrder::Ascending) => sql.push_str(" ORDER BY event_date ASC, uuid ASC"),
        Some(SortOrder::Descending) => sql.push_str(" ORDER BY event_date DESC, uuid ASC"),
        None => {}
    }
    if limited {
        sql.push_str(" LIMIT ?");
    }
    sql
}

fn ensure_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version = current_version(conn)?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    let table_exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [EVENTS_TABLE],
        |row| row.get(0),
    )?;
    if table_exists != 1 {
        return Err(RepoError::MissingRequiredTable(EVENTS_TABLE));
    }

    let mut stmt = conn.prepare("PRAGMA table_info(events);")?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>("name"))?
        .collect::<Result<HashSet<_>, _>>()?;
    if let Some(&column) = REQUIRED_COLUMNS
        .iter()
        .find(|column| !columns.contains(**column))
    {
        return Err(RepoError::MissingRequiredColumn {
            table: EVENTS_TABLE,
            column,
        });
    }

    Ok(())
}

fn required_date(event: &Event) -> RepoResult<i64> {
    event
        .date
        .ok_or_else(|| RepoError::InvalidData(format!("event {} has no date", event.id)))
}

fn parse_event_row(row: &Row<'_>) -> RepoResult<Event> {
    let uuid_text: String = row.get("uuid")?;
    let id = Uuid::parse_str(&uuid_text).map_err(|_| {
        RepoError::InvalidData(format!("invalid uuid value `{uuid_text}` in events.uuid"))
    })?;

    let recurrence_text: String = row.get("recurrence")?;
    let recurrence = Recurrence::parse(&recurrence_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid recurrence `{recurrence_text}` in events.recurrence"
        ))
    })?;

    let coordinates = match (
        row.get::<_, Option<f64>>("lat")?,
        row.get::<_, Option<f64>>("lng")?,
    ) {
        (Some(lat), Some(lng)) => Some((lat, lng)),
        (None, None) => None,
        _ => {
            return Err(RepoError::InvalidData(format!(
                "partial coordinate pair for event {id}"
            )));
        }
    };

    let mut event = Event::with_id(
        id,
        row.get::<_, String>("title")?,
        row.get::<_, i64>("event_date")?,
        row.get::<_, String>("location")?,
    )?;
    event.description = row.get("description")?;
    event.recurrence = recurrence;
    event.restore_persisted(coordinates, row.get("description_html")?);
    event.validate()?;
    Ok(event)
}
