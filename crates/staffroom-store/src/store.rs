//! [`SqliteStore`], the SQLite implementation of [`IdentityStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension as _};

use staffroom_core::{
    Attendance, Enrollment, Identity, IdentityId, IdentityPatch, IdentityStore, TransitionCommand,
};

use crate::{
    encode::{encode_attendance, encode_descriptor, encode_dt, RawIdentity, IDENTITY_COLUMNS},
    schema::SCHEMA,
    Result,
};

/// Identity store backed by a single SQLite file.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) a store at `path` and run schema initialisation.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!(
                    dir = %parent.display(),
                    error = %e,
                    "could not create database directory"
                );
            }
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Open an in-memory store, for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    fn fetch(&self, id: IdentityId) -> Result<Option<Identity>> {
        let sql = format!("SELECT {IDENTITY_COLUMNS} FROM identities WHERE id = ?1");
        self.conn
            .query_row(&sql, params![id], RawIdentity::from_row)
            .optional()?
            .map(RawIdentity::decode)
            .transpose()
    }
}

impl IdentityStore for SqliteStore {
    type Error = crate::Error;

    fn list(&self) -> Result<Vec<Identity>> {
        let sql = format!("SELECT {IDENTITY_COLUMNS} FROM identities ORDER BY id");
        let mut stmt = self.conn.prepare(&sql)?;
        let raws = stmt
            .query_map([], RawIdentity::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        raws.into_iter().map(RawIdentity::decode).collect()
    }

    fn get(&self, id: IdentityId) -> Result<Option<Identity>> {
        self.fetch(id)
    }

    fn create(&mut self, enrollment: &Enrollment, now: DateTime<Utc>) -> Result<Identity> {
        let fresh = Attendance::default();
        let (status, location) = encode_attendance(&fresh);
        let descriptor = encode_descriptor(&enrollment.descriptor)?;
        let at = encode_dt(now);

        self.conn.execute(
            "INSERT INTO identities (
               name, seat_code, department, descriptor,
               status, location, last_seen, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                enrollment.name,
                enrollment.seat_code,
                enrollment.department,
                descriptor,
                status,
                location,
                at,
            ],
        )?;

        Ok(Identity {
            id: self.conn.last_insert_rowid(),
            name: enrollment.name.clone(),
            seat_code: enrollment.seat_code.clone(),
            department: enrollment.department.clone(),
            descriptor: Some(enrollment.descriptor.clone()),
            attendance: Attendance::default(),
            last_seen: now,
        })
    }

    fn update(&mut self, id: IdentityId, patch: &IdentityPatch) -> Result<Option<Identity>> {
        let tx = self.conn.transaction()?;
        let current = tx
            .query_row(
                &format!("SELECT {IDENTITY_COLUMNS} FROM identities WHERE id = ?1"),
                params![id],
                RawIdentity::from_row,
            )
            .optional()?
            .map(RawIdentity::decode)
            .transpose()?;

        let Some(mut identity) = current else {
            return Ok(None);
        };
        patch.apply(&mut identity);

        tx.execute(
            "UPDATE identities SET name = ?2, seat_code = ?3, department = ?4 WHERE id = ?1",
            params![id, identity.name, identity.seat_code, identity.department],
        )?;
        tx.commit()?;
        Ok(Some(identity))
    }

    fn apply(&mut self, command: &TransitionCommand) -> Result<Option<Identity>> {
        let (status, location) = encode_attendance(&command.attendance);
        let changed = self.conn.execute(
            "UPDATE identities SET status = ?2, location = ?3, last_seen = ?4 WHERE id = ?1",
            params![command.identity_id, status, location, encode_dt(command.at)],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        self.fetch(command.identity_id)
    }

    fn delete(&mut self, id: IdentityId) -> Result<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM identities WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }
}
