use crate::domain::error::PhishError;
use crate::domain::model::DetectionRecord;
use std::path::Path;
use tokio_rusqlite::Connection;

pub async fn init_history(db_path: &Path) -> Result<Connection, PhishError> {
    let db = Connection::open(db_path.to_path_buf()).await?;
    create_schema(&db).await?;
    Ok(db)
}

/// In-memory history that lives as long as the connection.
pub async fn init_memory_history() -> Result<Connection, PhishError> {
    let db = Connection::open_in_memory().await?;
    create_schema(&db).await?;
    Ok(db)
}

async fn create_schema(db: &Connection) -> Result<(), PhishError> {
    db.call(|conn| {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS detections (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                time INTEGER NOT NULL,
                url TEXT NOT NULL,
                is_phishing INTEGER NOT NULL,
                data BLOB NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_detections_time ON detections(time)",
            [],
        )?;

        Ok::<_, rusqlite::Error>(())
    })
    .await?;

    Ok(())
}

/// Append one detection. History is write-once: rows are never updated.
pub async fn append(db: &Connection, record: &DetectionRecord) -> Result<(), PhishError> {
    use std::io::Cursor;
    use tokio_rusqlite::params;
    use zstd::stream::encode_all;

    let serialized = serde_json::to_vec(record)?;
    let compressed = encode_all(Cursor::new(&serialized), 0)?;

    let time = record.time;
    let url = record.url.clone();
    let is_phishing = record.is_phishing;

    db.call(move |conn| {
        conn.execute(
            "INSERT INTO detections (time, url, is_phishing, data) VALUES (?, ?, ?, ?)",
            params![time, url, is_phishing, compressed],
        )
    })
    .await?;

    Ok(())
}

/// Most recent detections first.
pub async fn recent(db: &Connection, limit: usize) -> Result<Vec<DetectionRecord>, PhishError> {
    use std::io::Cursor;
    use tokio_rusqlite::params;
    use zstd::stream::decode_all;

    let limit = limit as i64;
    let records = db
        .call(move |conn| {
            let mut stmt =
                conn.prepare("SELECT data FROM detections ORDER BY time DESC, id DESC LIMIT ?")?;
            let rows = stmt.query_map(params![limit], |row| {
                let compressed: Vec<u8> = row.get(0)?;
                let decompressed = decode_all(Cursor::new(&compressed)).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        0,
                        rusqlite::types::Type::Blob,
                        Box::new(e),
                    )
                })?;
                let record: DetectionRecord =
                    serde_json::from_slice(&decompressed).map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(
                            0,
                            rusqlite::types::Type::Blob,
                            Box::new(e),
                        )
                    })?;
                Ok(record)
            })?;
            let records = rows.collect::<Result<Vec<_>, _>>()?;
            Ok::<_, rusqlite::Error>(records)
        })
        .await?;

    Ok(records)
}

pub async fn count(db: &Connection) -> Result<usize, PhishError> {
    use tokio_rusqlite::params;

    let count: i64 = db
        .call(|conn| {
            conn.query_row("SELECT COUNT(*) FROM detections", params![], |row| {
                row.get(0)
            })
        })
        .await?;

    Ok(count as usize)
}
