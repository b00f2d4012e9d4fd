use chrono::Duration;
use rollcalld::db::{format_ts, parse_ts};
use rollcalld::ledger::{self, ChainLink};
use rollcalld::{Actor, AttendanceError, AttendanceService, Config, ManualClock, Role, Store};
use rusqlite::Connection;
use std::sync::Arc;
use tempfile::TempDir;

const T0: i64 = 1_757_326_500_000;

struct Ledger {
    _dir: TempDir,
    service: AttendanceService,
    admin: Actor,
}

impl Ledger {
    /// Four confirmed check-ins for S1 and one for S2, an hour apart.
    fn seeded() -> Ledger {
        let dir = tempfile::tempdir().expect("temp dir");
        let config = Config::default();
        let store = Store::open(dir.path(), &config).expect("open store");
        let clock = Arc::new(ManualClock::at_ms(T0 + 500));
        let service = AttendanceService::new(store, clock.clone(), config);
        let admin = Actor::new("admin", Role::Auditor);
        let teacher = Actor::new("T", Role::Teacher);
        service
            .upsert_section(&admin, "football", "Football")
            .expect("section");
        service
            .assign_teacher(&admin, "football", &teacher.id)
            .expect("assign");

        for round in 0..4 {
            let started = service
                .start_session(&teacher, "football", None)
                .expect("start");
            service.checkin(&started.code, "S1").expect("S1");
            if round == 0 {
                service.checkin(&started.code, "S2").expect("S2");
            }
            service
                .end_session(&started.session_id, &teacher, &["S1".to_string()])
                .expect("end");
            clock.advance_ms(60 * 60 * 1_000);
        }
        Ledger {
            _dir: dir,
            service,
            admin,
        }
    }

    /// A connection that bypasses the service, like someone editing the file.
    fn raw(&self) -> Connection {
        Connection::open(self.service.store().path()).expect("raw connection")
    }

    fn chain(&self, student: &str) -> Vec<ChainLink> {
        let conn = self.raw();
        ledger::load_chain(&conn, student).expect("load chain")
    }

    fn audit(&self, student: &str) -> ledger::ChainVerification {
        self.service
            .audit_chain(&self.admin, student)
            .expect("audit")
    }
}

#[test]
fn untouched_ledger_verifies() {
    let l = Ledger::seeded();
    let audit = l.audit("S1");
    assert!(audit.valid);
    assert_eq!(audit.total_records, 4);
    assert_eq!(audit.broken_at_index, None);
    assert!(audit.ensure_intact().is_ok());
}

#[test]
fn moving_a_record_to_another_session_is_detected() {
    let l = Ledger::seeded();
    let links = l.chain("S1");
    let other_session = links[0].session_id.clone();
    l.raw()
        .execute(
            "UPDATE attendance_records SET session_id = ? WHERE id = ?",
            (format!("{other_session}-forged"), &links[2].id),
        )
        .expect("tamper");

    let audit = l.audit("S1");
    assert!(!audit.valid);
    assert_eq!(audit.broken_at_index, Some(2));
    assert_eq!(audit.broken_at_id.as_deref(), Some(links[2].id.as_str()));
    match audit.ensure_intact() {
        Err(AttendanceError::ChainBroken { index, record_id }) => {
            assert_eq!(index, 2);
            assert_eq!(record_id, links[2].id);
        }
        other => panic!("expected chain_broken, got {other:?}"),
    }
}

#[test]
fn strict_audit_fails_with_the_break_position() {
    let l = Ledger::seeded();
    let intact = l
        .service
        .require_intact_chain(&l.admin, "S1")
        .expect("intact chain");
    assert_eq!(intact.total_records, 4);

    let links = l.chain("S1");
    l.raw()
        .execute("DELETE FROM attendance_records WHERE id = ?", [&links[2].id])
        .expect("tamper");
    match l.service.require_intact_chain(&l.admin, "S1") {
        Err(e @ AttendanceError::ChainBroken { .. }) => {
            assert_eq!(e.code(), "chain_broken");
            let details = e.details().expect("details");
            assert_eq!(details["brokenAtIndex"], 2);
            assert_eq!(details["brokenAtId"].as_str(), Some(links[3].id.as_str()));
        }
        other => panic!("expected chain_broken, got {other:?}"),
    }
    assert!(matches!(
        l.service
            .require_intact_chain(&Actor::new("T", Role::Teacher), "S1"),
        Err(AttendanceError::Forbidden(_))
    ));
}

#[test]
fn shifting_a_timestamp_is_detected() {
    let l = Ledger::seeded();
    let links = l.chain("S1");
    let shifted = parse_ts(&links[1].checked_in_at).expect("ts") + Duration::seconds(1);
    l.raw()
        .execute(
            "UPDATE attendance_records SET checked_in_at = ? WHERE id = ?",
            (format_ts(&shifted), &links[1].id),
        )
        .expect("tamper");

    let audit = l.audit("S1");
    assert!(!audit.valid);
    assert_eq!(audit.broken_at_index, Some(1));
}

#[test]
fn deleting_a_record_breaks_its_successor() {
    let l = Ledger::seeded();
    let links = l.chain("S1");
    l.raw()
        .execute("DELETE FROM attendance_records WHERE id = ?", [&links[1].id])
        .expect("tamper");

    let audit = l.audit("S1");
    assert!(!audit.valid);
    assert_eq!(audit.total_records, 3);
    assert_eq!(audit.broken_at_index, Some(1));
    assert_eq!(audit.broken_at_id.as_deref(), Some(links[2].id.as_str()));
}

#[test]
fn rewriting_the_last_hash_is_detected() {
    let l = Ledger::seeded();
    let links = l.chain("S1");
    l.raw()
        .execute(
            "UPDATE attendance_records SET hash = ? WHERE id = ?",
            ("0".repeat(64), &links[3].id),
        )
        .expect("tamper");

    let audit = l.audit("S1");
    assert_eq!(audit.broken_at_index, Some(3));
}

#[test]
fn tampering_stays_within_one_students_chain() {
    let l = Ledger::seeded();
    let links = l.chain("S1");
    l.raw()
        .execute("DELETE FROM attendance_records WHERE id = ?", [&links[0].id])
        .expect("tamper");

    assert_eq!(l.audit("S1").broken_at_index, Some(0));
    let other = l.audit("S2");
    assert!(other.valid);
    assert_eq!(other.total_records, 1);
}

#[test]
fn settlement_fields_are_outside_the_hash() {
    let l = Ledger::seeded();
    l.raw()
        .execute(
            "UPDATE attendance_records SET status = 'rejected', confirmed_at = NULL WHERE student_id = 'S1'",
            [],
        )
        .expect("edit status");
    assert!(l.audit("S1").valid);
    assert_eq!(l.service.progress("S1").expect("progress").rejected, 4);
}
