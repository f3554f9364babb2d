use crate::emotion::{AnalysisSource, DiarySummary, Emotion, EmotionDimensions, EmotionReading, EmotionRecord, NewEmotionRecord};
use crate::error::{AnalysisError, Result};
use crate::logging;
use crate::store::{AnalysisStatus, Diary, EmotionStore};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

const SCHEMA: &str = "
    -- Diary entries (owned by a user; the unit of analysis)
    CREATE TABLE IF NOT EXISTS diaries (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        content TEXT NOT NULL,
        analysis_status TEXT NOT NULL DEFAULT 'pending',
        emotion_score TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_diaries_user ON diaries(user_id, created_at);

    -- One analysis per diary, removed with its diary
    CREATE TABLE IF NOT EXISTS emotion_analyses (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        diary_id INTEGER NOT NULL UNIQUE,
        overall_emotion TEXT NOT NULL,
        emotion_intensity REAL NOT NULL,
        emotion_dimensions TEXT NOT NULL,
        key_words TEXT NOT NULL,
        confidence_score REAL NOT NULL,
        ai_model_version TEXT NOT NULL,
        analyzed_at TEXT NOT NULL,
        FOREIGN KEY (diary_id) REFERENCES diaries(id) ON DELETE CASCADE
    );

    CREATE INDEX IF NOT EXISTS idx_analyses_time ON emotion_analyses(analyzed_at);
";

const RECORD_COLUMNS: &str = "a.id, a.diary_id, a.overall_emotion, a.emotion_intensity, a.emotion_dimensions, \
     a.key_words, a.confidence_score, a.ai_model_version, a.analyzed_at";

/// Fixed-width UTC timestamps so text ordering matches time ordering
fn to_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| AnalysisError::Internal(format!("bad timestamp {:?}: {}", raw, e)))
}

/// Raw analysis row, decoded into an [`EmotionRecord`] outside the rusqlite closure
struct RecordRow {
    id: i64,
    diary_id: i64,
    overall_emotion: String,
    emotion_intensity: f64,
    emotion_dimensions: String,
    key_words: String,
    confidence_score: f64,
    ai_model_version: String,
    analyzed_at: String,
}

impl RecordRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(RecordRow {
            id: row.get(0)?,
            diary_id: row.get(1)?,
            overall_emotion: row.get(2)?,
            emotion_intensity: row.get(3)?,
            emotion_dimensions: row.get(4)?,
            key_words: row.get(5)?,
            confidence_score: row.get(6)?,
            ai_model_version: row.get(7)?,
            analyzed_at: row.get(8)?,
        })
    }

    fn into_record(self) -> Result<EmotionRecord> {
        let overall_emotion = Emotion::from_str(&self.overall_emotion)
            .ok_or_else(|| AnalysisError::Internal(format!("unknown emotion {:?}", self.overall_emotion)))?;
        let source = AnalysisSource::from_str(&self.ai_model_version)
            .ok_or_else(|| AnalysisError::Internal(format!("unknown source {:?}", self.ai_model_version)))?;
        let emotion_dimensions: EmotionDimensions = serde_json::from_str(&self.emotion_dimensions)?;
        let key_words: Vec<String> = serde_json::from_str(&self.key_words)?;

        Ok(EmotionRecord {
            id: self.id,
            diary_id: self.diary_id,
            reading: EmotionReading {
                overall_emotion,
                emotion_intensity: self.emotion_intensity,
                emotion_dimensions,
                key_words,
                confidence_score: self.confidence_score,
            },
            source,
            analyzed_at: parse_timestamp(&self.analyzed_at)?,
        })
    }
}

struct DiaryRow {
    id: i64,
    user_id: i64,
    content: String,
    analysis_status: String,
    emotion_score: Option<String>,
    created_at: String,
    updated_at: String,
}

impl DiaryRow {
    fn into_diary(self) -> Result<Diary> {
        let analysis_status = AnalysisStatus::from_str(&self.analysis_status)
            .ok_or_else(|| AnalysisError::Internal(format!("unknown status {:?}", self.analysis_status)))?;
        let emotion_score = match self.emotion_score {
            Some(raw) => Some(serde_json::from_str::<DiarySummary>(&raw)?),
            None => None,
        };

        Ok(Diary {
            id: self.id,
            user_id: self.user_id,
            content: self.content,
            analysis_status,
            emotion_score,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

fn insert_record(conn: &Connection, record: &NewEmotionRecord) -> Result<EmotionRecord> {
    let reading = &record.reading;
    let stamp = to_timestamp(&record.analyzed_at);
    conn.execute(
        "INSERT INTO emotion_analyses (diary_id, overall_emotion, emotion_intensity, emotion_dimensions, key_words, confidence_score, ai_model_version, analyzed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            record.diary_id,
            reading.overall_emotion.as_str(),
            reading.emotion_intensity,
            serde_json::to_string(&reading.emotion_dimensions)?,
            serde_json::to_string(&reading.key_words)?,
            reading.confidence_score,
            record.source.as_str(),
            stamp
        ]
    )?;

    Ok(EmotionRecord {
        id: conn.last_insert_rowid(),
        diary_id: record.diary_id,
        reading: reading.clone(),
        source: record.source,
        // what a later read returns, sub-microsecond digits dropped
        analyzed_at: parse_timestamp(&stamp)?,
    })
}

fn write_summary(conn: &Connection, diary_id: i64, summary: &DiarySummary) -> Result<()> {
    let now = to_timestamp(&Utc::now());
    let updated = conn.execute(
        "UPDATE diaries SET analysis_status = ?1, emotion_score = ?2, updated_at = ?3 WHERE id = ?4",
        params![
            AnalysisStatus::Completed.as_str(),
            serde_json::to_string(summary)?,
            now,
            diary_id
        ]
    )?;

    if updated == 0 {
        return Err(AnalysisError::NotFound(format!("diary {}", diary_id)));
    }
    Ok(())
}

/// SQLite-backed diary and analysis store
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| AnalysisError::Internal(format!("cannot create {}: {}", parent.display(), e)))?;
            }
        }
        let db = Self::init(Connection::open(path)?)?;
        logging::log_storage(&format!("Opened database at {}", path.display()));
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self.conn
            .lock()
            .map_err(|_| AnalysisError::Internal("database lock poisoned".to_string()))?;
        f(&mut conn)
    }

    // ============ Diaries ============

    pub fn create_diary(&self, user_id: i64, content: &str) -> Result<Diary> {
        self.insert_diary(user_id, content, Utc::now())
    }

    /// Insert a diary with an explicit creation time (imports, tests)
    pub fn insert_diary(&self, user_id: i64, content: &str, created_at: DateTime<Utc>) -> Result<Diary> {
        let stamp = to_timestamp(&created_at);
        let created_at = parse_timestamp(&stamp)?;
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO diaries (user_id, content, analysis_status, emotion_score, created_at, updated_at)
                 VALUES (?1, ?2, ?3, NULL, ?4, ?5)",
                params![user_id, content, AnalysisStatus::Pending.as_str(), stamp, stamp]
            )?;
            Ok(Diary {
                id: conn.last_insert_rowid(),
                user_id,
                content: content.to_string(),
                analysis_status: AnalysisStatus::Pending,
                emotion_score: None,
                created_at,
                updated_at: created_at,
            })
        })
    }

    /// Delete a diary owned by `owner_id`; its analysis goes with it.
    pub fn delete_diary(&self, diary_id: i64, owner_id: i64) -> Result<bool> {
        self.with_connection(|conn| {
            let deleted = conn.execute(
                "DELETE FROM diaries WHERE id = ?1 AND user_id = ?2",
                params![diary_id, owner_id]
            )?;
            Ok(deleted > 0)
        })
    }

    fn query_records(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<EmotionRecord>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt
                .query_map(params, RecordRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(RecordRow::into_record).collect()
        })
    }
}

impl EmotionStore for Database {
    fn fetch_diary(&self, diary_id: i64, owner_id: i64) -> Result<Option<Diary>> {
        let row = self.with_connection(|conn| {
            Ok(conn.query_row(
                "SELECT id, user_id, content, analysis_status, emotion_score, created_at, updated_at
                 FROM diaries WHERE id = ?1 AND user_id = ?2",
                params![diary_id, owner_id],
                |row| {
                    Ok(DiaryRow {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        content: row.get(2)?,
                        analysis_status: row.get(3)?,
                        emotion_score: row.get(4)?,
                        created_at: row.get(5)?,
                        updated_at: row.get(6)?,
                    })
                }
            ).optional()?)
        })?;

        row.map(DiaryRow::into_diary).transpose()
    }

    fn find_record_by_diary(&self, diary_id: i64) -> Result<Option<EmotionRecord>> {
        let row = self.with_connection(|conn| {
            Ok(conn.query_row(
                &format!("SELECT {} FROM emotion_analyses a WHERE a.diary_id = ?1", RECORD_COLUMNS),
                params![diary_id],
                RecordRow::from_row
            ).optional()?)
        })?;

        row.map(RecordRow::into_record).transpose()
    }

    fn save_record(&self, record: &NewEmotionRecord) -> Result<EmotionRecord> {
        self.with_connection(|conn| insert_record(conn, record))
    }

    fn update_diary_summary(&self, diary_id: i64, summary: &DiarySummary) -> Result<()> {
        self.with_connection(|conn| write_summary(conn, diary_id, summary))
    }

    fn persist_analysis(&self, record: &NewEmotionRecord, summary: &DiarySummary) -> Result<EmotionRecord> {
        self.with_connection(|conn| {
            // Dropping the transaction on any error rolls both writes back
            let tx = conn.transaction()?;
            let saved = insert_record(&tx, record)?;
            write_summary(&tx, record.diary_id, summary)?;
            tx.commit()?;
            Ok(saved)
        })
    }

    fn records_since(&self, user_id: i64, since: DateTime<Utc>) -> Result<Vec<EmotionRecord>> {
        let since = to_timestamp(&since);
        self.query_records(
            &format!(
                "SELECT {} FROM emotion_analyses a JOIN diaries d ON a.diary_id = d.id
                 WHERE d.user_id = ?1 AND a.analyzed_at >= ?2
                 ORDER BY a.analyzed_at ASC, a.id ASC",
                RECORD_COLUMNS
            ),
            params![user_id, since],
        )
    }

    fn recent_confident_records(
        &self,
        user_id: i64,
        min_confidence: f64,
        limit: usize,
    ) -> Result<Vec<EmotionRecord>> {
        self.query_records(
            &format!(
                "SELECT {} FROM emotion_analyses a JOIN diaries d ON a.diary_id = d.id
                 WHERE d.user_id = ?1 AND a.confidence_score > ?2
                 ORDER BY a.analyzed_at DESC, a.id DESC
                 LIMIT ?3",
                RECORD_COLUMNS
            ),
            params![user_id, min_confidence, limit as i64],
        )
    }

    fn analysis_page(
        &self,
        user_id: i64,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<(EmotionRecord, String)>, usize)> {
        let (rows, total) = self.with_connection(|conn| {
            let total: i64 = conn.query_row(
                "SELECT COUNT(*) FROM emotion_analyses a JOIN diaries d ON a.diary_id = d.id WHERE d.user_id = ?1",
                params![user_id],
                |row| row.get(0)
            )?;

            let mut stmt = conn.prepare(&format!(
                "SELECT {}, d.content FROM emotion_analyses a JOIN diaries d ON a.diary_id = d.id
                 WHERE d.user_id = ?1
                 ORDER BY a.analyzed_at DESC, a.id DESC
                 LIMIT ?2 OFFSET ?3",
                RECORD_COLUMNS
            ))?;
            let rows = stmt
                .query_map(params![user_id, limit as i64, offset as i64], |row| {
                    Ok((RecordRow::from_row(row)?, row.get::<_, String>(9)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok((rows, total as usize))
        })?;

        let entries = rows
            .into_iter()
            .map(|(row, content)| Ok((row.into_record()?, content)))
            .collect::<Result<Vec<_>>>()?;
        Ok((entries, total))
    }

    fn count_diaries(&self, user_id: i64, since: Option<DateTime<Utc>>) -> Result<usize> {
        self.with_connection(|conn| {
            let count: i64 = match since {
                Some(since) => conn.query_row(
                    "SELECT COUNT(*) FROM diaries WHERE user_id = ?1 AND created_at >= ?2",
                    params![user_id, to_timestamp(&since)],
                    |row| row.get(0)
                )?,
                None => conn.query_row(
                    "SELECT COUNT(*) FROM diaries WHERE user_id = ?1",
                    params![user_id],
                    |row| row.get(0)
                )?,
            };
            Ok(count as usize)
        })
    }

    fn count_records(&self, user_id: i64) -> Result<usize> {
        self.with_connection(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM emotion_analyses a JOIN diaries d ON a.diary_id = d.id WHERE d.user_id = ?1",
                params![user_id],
                |row| row.get(0)
            )?;
            Ok(count as usize)
        })
    }
}
