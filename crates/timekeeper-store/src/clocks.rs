use rusqlite::{params, Connection};
use timekeeper_core::types::{self, now_rfc3339, ClockStatus, Management};

use crate::db::{row_to_clock, CLOCK_SELECT_SQL};
use crate::error::{Result, StoreError};
use crate::types::{Clock, NewClock};

/// Insert a brand-new clock row.
///
/// `gcp_name` is derived from the name here, once — renaming the clock later
/// must not move the remote job. Managed clocks start out `broken` until the
/// first reconciliation succeeds; manual clocks are pinned to `unknown`.
pub fn create_clock(conn: &Connection, new: &NewClock, default_time_zone: &str) -> Result<Clock> {
    if new.name.is_empty() || new.name.len() > types::MAX_NAME_LENGTH {
        return Err(StoreError::InvalidValue(format!(
            "clock name must be 1..={} characters",
            types::MAX_NAME_LENGTH
        )));
    }
    let now = now_rfc3339();
    let gcp_name = types::gcp_name(&new.name);
    let status = initial_status(new.management);
    let time_zone = new
        .time_zone
        .clone()
        .unwrap_or_else(|| default_time_zone.to_string());
    conn.execute(
        "INSERT INTO clocks
         (name, gcp_name, description, cron, time_zone, management, status,
          service_account, created_at, updated_at)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?9)",
        params![
            new.name,
            gcp_name,
            new.description,
            new.cron,
            time_zone,
            new.management.to_string(),
            status.to_string(),
            new.service_account,
            now,
        ],
    )?;
    let id = conn.last_insert_rowid();
    Ok(Clock {
        id,
        name: new.name.clone(),
        gcp_name,
        description: new.description.clone(),
        cron: new.cron.clone(),
        time_zone,
        management: new.management,
        status,
        service_account: new.service_account.clone(),
        created_at: now.clone(),
        updated_at: now,
    })
}

fn initial_status(management: Management) -> ClockStatus {
    match management {
        Management::Manual => ClockStatus::Unknown,
        Management::Gcp => ClockStatus::Broken,
    }
}

pub fn get_clock(conn: &Connection, id: i64) -> Result<Option<Clock>> {
    let sql = format!("{CLOCK_SELECT_SQL} WHERE id = ?1");
    let mut stmt = conn.prepare(&sql)?;
    match stmt.query_row(params![id], row_to_clock) {
        Ok(c) => Ok(Some(c)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(StoreError::Database(e)),
    }
}

pub fn list_clocks(conn: &Connection) -> Result<Vec<Clock>> {
    let sql = format!("{CLOCK_SELECT_SQL} ORDER BY id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], row_to_clock)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

/// Persist the mutable fields of an existing clock. This is a plain field
/// write: it never contacts the remote scheduler and never rewrites
/// `gcp_name`. Manual clocks are forced back to `unknown` on every write.
pub fn update_clock_fields(conn: &Connection, clock: &Clock) -> Result<()> {
    let status = match clock.management {
        Management::Manual => ClockStatus::Unknown,
        Management::Gcp => clock.status,
    };
    let now = now_rfc3339();
    let n = conn.execute(
        "UPDATE clocks SET
            name=?2, description=?3, cron=?4, time_zone=?5, management=?6,
            status=?7, service_account=?8, updated_at=?9
         WHERE id=?1",
        params![
            clock.id,
            clock.name,
            clock.description,
            clock.cron,
            clock.time_zone,
            clock.management.to_string(),
            status.to_string(),
            clock.service_account,
            now,
        ],
    )?;
    if n == 0 {
        return Err(StoreError::NotFound {
            kind: "clock",
            id: clock.id.to_string(),
        });
    }
    Ok(())
}

/// Record a status transition decided by the reconciler.
pub fn set_clock_status(conn: &Connection, id: i64, status: ClockStatus) -> Result<()> {
    let now = now_rfc3339();
    let n = conn.execute(
        "UPDATE clocks SET status=?2, updated_at=?3 WHERE id=?1",
        params![id, status.to_string(), now],
    )?;
    if n == 0 {
        return Err(StoreError::NotFound {
            kind: "clock",
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Flip a clock to remote management. Used by `sync`, which repairs clocks
/// that were switched to manual while the remote job drifted.
pub fn set_clock_management(conn: &Connection, id: i64, management: Management) -> Result<()> {
    let now = now_rfc3339();
    let n = conn.execute(
        "UPDATE clocks SET management=?2, updated_at=?3 WHERE id=?1",
        params![id, management.to_string(), now],
    )?;
    if n == 0 {
        return Err(StoreError::NotFound {
            kind: "clock",
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Remove the local row. Callers must have deleted the remote job first;
/// schedules referencing the clock fall back to `clock_id = NULL`.
pub fn delete_clock_row(conn: &Connection, id: i64) -> Result<()> {
    conn.execute(
        "UPDATE task_schedules SET clock_id = NULL WHERE clock_id = ?1",
        params![id],
    )?;
    let n = conn.execute("DELETE FROM clocks WHERE id = ?1", params![id])?;
    if n == 0 {
        return Err(StoreError::NotFound {
            kind: "clock",
            id: id.to_string(),
        });
    }
    Ok(())
}
