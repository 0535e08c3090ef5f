///! Append-only snapshot persistence.
///!
///! Snapshots land in a single SQLite table through a dedicated writer
///! thread, so id assignment is race-free. Lookups run on a separate reader
///! connection and do not queue behind appends. Every statement is
///! parameterized; externally supplied values never reach SQL text.

use std::path::Path;
use std::sync::{Arc, Mutex, mpsc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use thiserror::Error;
use tokio::sync::oneshot;

use skystat_common::{NewSnapshot, StatusSnapshot};

/// Persistence failure, tagged with the statement stage that failed so an
/// operator can tell a schema problem from a bad bind without log
/// correlation.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("statement prepare failed: {0}")]
    Prepare(rusqlite::Error),

    #[error("parameter bind failed: {0}")]
    Bind(rusqlite::Error),

    #[error("statement execute failed: {0}")]
    Execute(rusqlite::Error),
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// Unknown id, or "latest" on an empty store.
    #[error("snapshot not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

fn classify_execute(err: rusqlite::Error) -> StorageError {
    match &err {
        rusqlite::Error::InvalidParameterCount(..)
        | rusqlite::Error::InvalidParameterName(..)
        | rusqlite::Error::ToSqlConversionFailure(..) => StorageError::Bind(err),
        _ => StorageError::Execute(err),
    }
}

const SCHEMA_SQL: &str = "CREATE TABLE IF NOT EXISTS snapshots (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    instrument       TEXT NOT NULL,
    project          TEXT NOT NULL,
    update_time      TEXT NOT NULL,
    avg_guide_error  REAL NOT NULL,
    ccd_temperature  REAL NOT NULL,
    last_image_start TEXT NOT NULL,
    exposure_time    REAL NOT NULL,
    current_task_id  INTEGER NOT NULL,
    right_ascension  REAL NOT NULL,
    declination      REAL NOT NULL,
    west_pier        INTEGER NOT NULL,
    filter           INTEGER NOT NULL,
    site_longitude   REAL NOT NULL,
    site_latitude    REAL NOT NULL,
    focus            INTEGER NOT NULL
)";

const INSERT_SQL: &str = "INSERT INTO snapshots (
    instrument, project, update_time, avg_guide_error, ccd_temperature,
    last_image_start, exposure_time, current_task_id, right_ascension,
    declination, west_pier, filter, site_longitude, site_latitude, focus
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)";

const SELECT_BY_ID_SQL: &str = "SELECT
    id, instrument, project, update_time, avg_guide_error, ccd_temperature,
    last_image_start, exposure_time, current_task_id, right_ascension,
    declination, west_pier, filter, site_longitude, site_latitude, focus
 FROM snapshots WHERE id = ?1";

const SELECT_LATEST_SQL: &str = "SELECT
    id, instrument, project, update_time, avg_guide_error, ccd_temperature,
    last_image_start, exposure_time, current_task_id, right_ascension,
    declination, west_pier, filter, site_longitude, site_latitude, focus
 FROM snapshots ORDER BY id DESC LIMIT 1";

type StoreTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum WorkerCommand {
    Run(StoreTask),
    Shutdown,
}

/// A thread owning one SQLite connection, fed through a channel. The writer
/// instance is the single id-serialization point of the whole service.
struct Worker {
    sender: mpsc::Sender<WorkerCommand>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Worker {
    fn spawn(
        name: &str,
        open: impl FnOnce() -> Result<Connection, StorageError> + Send + 'static,
    ) -> Result<Self, StorageError> {
        let (command_tx, command_rx) = mpsc::channel::<WorkerCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let mut conn = match open() {
                    Ok(conn) => {
                        let _ = ready_tx.send(Ok(()));
                        conn
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };

                while let Ok(command) = command_rx.recv() {
                    match command {
                        WorkerCommand::Run(task) => task(&mut conn),
                        WorkerCommand::Shutdown => break,
                    }
                }
            })
            .map_err(|e| StorageError::Unavailable(format!("failed to spawn {name}: {e}")))?;

        ready_rx
            .recv()
            .map_err(|_| {
                StorageError::Unavailable("store worker exited during startup".to_string())
            })??;

        Ok(Self {
            sender: command_tx,
            handle: Mutex::new(Some(handle)),
        })
    }

    async fn run<F, T>(&self, task: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let command = WorkerCommand::Run(Box::new(move |conn| {
            let _ = reply_tx.send(task(conn));
        }));

        self.sender
            .send(command)
            .map_err(|_| StorageError::Unavailable("store worker is gone".to_string()))?;

        reply_rx
            .await
            .map_err(|_| StorageError::Unavailable("store worker dropped the request".to_string()))?
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        let mut guard = match self.handle.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(handle) = guard.take() {
            let _ = self.sender.send(WorkerCommand::Shutdown);
            let _ = handle.join();
        }
    }
}

/// Handle to the snapshot log. Cheap to clone; all clones share one writer
/// and one reader connection.
#[derive(Clone)]
pub struct SnapshotStore {
    writer: Arc<Worker>,
    reader: Arc<Worker>,
}

impl SnapshotStore {
    /// Open the snapshot database, initializing the schema on first run.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StorageError::Unavailable(format!(
                        "failed to create database directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
        }

        let writer_path = path.clone();
        let writer = Worker::spawn("skystat-db-writer", move || open_writer(&writer_path))?;
        // The reader gets its own connection; with WAL journaling its reads
        // never wait on an in-flight append.
        let reader_path = path.clone();
        let reader = Worker::spawn("skystat-db-reader", move || open_reader(&reader_path))?;

        tracing::info!("snapshot store ready at {}", path.display());

        Ok(Self {
            writer: Arc::new(writer),
            reader: Arc::new(reader),
        })
    }

    /// Persist a new snapshot and return its assigned id. Ids are strictly
    /// increasing and never reused.
    pub async fn append(&self, fields: NewSnapshot) -> Result<i64, StoreError> {
        self.writer
            .run(move |conn| {
                let mut stmt = conn.prepare(INSERT_SQL).map_err(StorageError::Prepare)?;
                let id = stmt
                    .insert(params![
                        fields.instrument,
                        fields.project,
                        fields.update_time.to_rfc3339(),
                        fields.avg_guide_error,
                        fields.ccd_temperature,
                        fields.last_image_start.to_rfc3339(),
                        fields.exposure_time,
                        fields.current_task_id,
                        fields.right_ascension,
                        fields.declination,
                        fields.west_pier,
                        fields.filter_code,
                        fields.site_longitude,
                        fields.site_latitude,
                        fields.focus,
                    ])
                    .map_err(classify_execute)?;
                Ok(id)
            })
            .await
    }

    pub async fn get_by_id(&self, id: i64) -> Result<StatusSnapshot, StoreError> {
        self.reader
            .run(move |conn| {
                let mut stmt = conn
                    .prepare(SELECT_BY_ID_SQL)
                    .map_err(StorageError::Prepare)?;
                let mut rows = stmt.query(params![id]).map_err(classify_execute)?;
                match rows.next().map_err(StorageError::Execute)? {
                    Some(row) => Ok(snapshot_from_row(row).map_err(StorageError::Execute)?),
                    None => Err(StoreError::NotFound(format!("id {id}"))),
                }
            })
            .await
    }

    /// The snapshot with the greatest id, or `NotFound` on an empty store.
    pub async fn get_latest(&self) -> Result<StatusSnapshot, StoreError> {
        self.reader
            .run(|conn| {
                let mut stmt = conn
                    .prepare(SELECT_LATEST_SQL)
                    .map_err(StorageError::Prepare)?;
                let mut rows = stmt.query([]).map_err(classify_execute)?;
                match rows.next().map_err(StorageError::Execute)? {
                    Some(row) => Ok(snapshot_from_row(row).map_err(StorageError::Execute)?),
                    None => Err(StoreError::NotFound("latest (store is empty)".to_string())),
                }
            })
            .await
    }
}

fn open_writer(path: &Path) -> Result<Connection, StorageError> {
    let conn = open_connection(path)?;
    conn.execute(SCHEMA_SQL, [])
        .map_err(|e| StorageError::Unavailable(format!("schema initialization failed: {e}")))?;
    Ok(conn)
}

fn open_reader(path: &Path) -> Result<Connection, StorageError> {
    // Only ever runs SELECTs; the writer has created the schema by now.
    open_connection(path)
}

fn open_connection(path: &Path) -> Result<Connection, StorageError> {
    let conn = Connection::open(path).map_err(|e| {
        StorageError::Unavailable(format!("failed to open {}: {e}", path.display()))
    })?;
    conn.pragma_update(None, "journal_mode", "WAL")
        .map_err(|e| StorageError::Unavailable(format!("failed to enable WAL: {e}")))?;
    conn.busy_timeout(Duration::from_secs(5))
        .map_err(|e| StorageError::Unavailable(format!("failed to set busy timeout: {e}")))?;
    Ok(conn)
}

fn snapshot_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StatusSnapshot> {
    Ok(StatusSnapshot {
        id: row.get(0)?,
        instrument: row.get(1)?,
        project: row.get(2)?,
        update_time: datetime_from_column(row, 3)?,
        avg_guide_error: row.get(4)?,
        ccd_temperature: row.get(5)?,
        last_image_start: datetime_from_column(row, 6)?,
        exposure_time: row.get(7)?,
        current_task_id: row.get(8)?,
        right_ascension: row.get(9)?,
        declination: row.get(10)?,
        west_pier: row.get(11)?,
        filter_code: row.get(12)?,
        site_longitude: row.get(13)?,
        site_latitude: row.get(14)?,
        focus: row.get(15)?,
    })
}

fn datetime_from_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}
