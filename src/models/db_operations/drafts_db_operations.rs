use redb::{Database, ReadableTable, TableDefinition, TableError};
use crate::models::db_operations::DbError;
use crate::models::Draft;

/// One row per owner holding that owner's whole draft collection as a JSON
/// array. Writes replace the collection; the last writer wins.
pub const DRAFTS: TableDefinition<i64, &str> = TableDefinition::new("drafts");

pub fn read_drafts(db: &Database, owner: i64) -> Result<Vec<Draft>, DbError> {
    let read_txn = db.begin_read()?;
    let table = match read_txn.open_table(DRAFTS) {
        Ok(table) => table,
        // Nothing has been written yet on a fresh database.
        Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let drafts = match table.get(owner)? {
        Some(guard) => serde_json::from_str(guard.value())?,
        None => Vec::new(),
    };
    Ok(drafts)
}

pub fn write_drafts(db: &Database, owner: i64, drafts: &[Draft]) -> Result<(), DbError> {
    let drafts_json = serde_json::to_string(drafts)?;

    let write_txn = db.begin_write()?;
    {
        let mut table = write_txn.open_table(DRAFTS)?;
        if drafts.is_empty() {
            table.remove(owner)?;
        } else {
            table.insert(owner, drafts_json.as_str())?;
        }
    }
    write_txn.commit()?;
    Ok(())
}

/// Number of drafts across all owners, for the admin dashboard.
pub fn count_all_drafts(db: &Database) -> Result<usize, DbError> {
    let read_txn = db.begin_read()?;
    let table = match read_txn.open_table(DRAFTS) {
        Ok(table) => table,
        Err(TableError::TableDoesNotExist(_)) => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let mut total = 0;
    for entry in table.iter()? {
        let (_, drafts_json) = entry?;
        let drafts: Vec<Draft> = serde_json::from_str(drafts_json.value())?;
        total += drafts.len();
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn open_db() -> (TempDir, Database) {
        let dir = TempDir::new().unwrap();
        let db = Database::create(dir.path().join("posts.db")).unwrap();
        (dir, db)
    }

    #[test]
    fn unknown_owner_has_no_drafts() {
        let (_dir, db) = open_db();
        assert!(read_drafts(&db, 42).unwrap().is_empty());
    }

    #[test]
    fn collections_are_kept_per_owner() {
        let (_dir, db) = open_db();
        let now = Utc::now();
        let mut first = Draft::empty("1".into(), now);
        first.title = "Mine".into();
        write_drafts(&db, 1, &[first.clone()]).unwrap();
        write_drafts(&db, 2, &[Draft::empty("2".into(), now)]).unwrap();

        assert_eq!(read_drafts(&db, 1).unwrap(), vec![first]);
        assert_eq!(read_drafts(&db, 2).unwrap().len(), 1);
        assert_eq!(count_all_drafts(&db).unwrap(), 2);
    }

    #[test]
    fn writing_an_empty_collection_removes_the_row() {
        let (_dir, db) = open_db();
        write_drafts(&db, 1, &[Draft::empty("1".into(), Utc::now())]).unwrap();
        write_drafts(&db, 1, &[]).unwrap();
        assert!(read_drafts(&db, 1).unwrap().is_empty());
        assert_eq!(count_all_drafts(&db).unwrap(), 0);
    }

    #[test]
    fn corrupted_collection_is_reported() {
        let (_dir, db) = open_db();
        let write_txn = db.begin_write().unwrap();
        {
            let mut table = write_txn.open_table(DRAFTS).unwrap();
            table.insert(7, "{not json").unwrap();
        }
        write_txn.commit().unwrap();

        assert!(matches!(read_drafts(&db, 7), Err(DbError::SerdeJson(_))));
    }
}
