use std::time::Duration;

use rusqlite::Connection;
use time::macros::{date, time};
use time::Date;
use uuid::Uuid;

use super::lease::{LeaseError, SeriesLease};
use super::populate::{populate_recurring_tasks, PopulateError, PopulateParams};
use super::{AheadOutcome, LookAhead, RecurrenceError, RecurrenceManager};
use crate::config::LeaseConfig;
use crate::db::{self, NewTaskRow};
use crate::domain::recurrence::RecurrenceType;

const TODAY: Date = date!(2026 - 10 - 19);

struct TestStore {
    path: String,
    conn: Connection,
}

impl TestStore {
    fn open() -> Self {
        let path = std::env::temp_dir()
            .join(format!("dayplan-recurrence-{}.sqlite", Uuid::now_v7()))
            .display()
            .to_string();
        let conn = db::open_connection(&path).expect("connection should open");
        Self { path, conn }
    }

    fn manager(&self) -> RecurrenceManager<'_> {
        RecurrenceManager::new(&self.conn, LookAhead::default(), &LeaseConfig::default())
    }

    fn template(&self, name: &str, day: Date, recurrence: Option<RecurrenceType>) -> i64 {
        self.insert(name, day, recurrence, None, None)
    }

    fn insert(
        &self,
        name: &str,
        day: Date,
        recurrence: Option<RecurrenceType>,
        end: Option<Date>,
        parent_id: Option<i64>,
    ) -> i64 {
        db::insert_task(
            &self.conn,
            &NewTaskRow {
                created_at: TODAY,
                name,
                day,
                position: 1,
                is_recurring: recurrence.is_some(),
                recurrence_type: recurrence,
                recurrence_end_date: end,
                parent_id,
            },
        )
        .expect("insert should succeed")
    }

    fn future(&self, series_id: i64, from: Date) -> i64 {
        db::count_future_occurrences(&self.conn, series_id, from).expect("count should succeed")
    }

    fn series_days(&self, series_id: i64) -> Vec<Date> {
        db::series_days(&self.conn, series_id).expect("days should load")
    }
}

impl Drop for TestStore {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{suffix}", self.path));
        }
    }
}

#[test]
fn daily_series_fills_exactly_the_look_ahead() {
    let store = TestStore::open();
    let template = store.template("Stretch", TODAY, Some(RecurrenceType::Daily));
    db::upsert_reminder(&store.conn, template, time!(7:15), TODAY, true)
        .expect("reminder should be stored");

    let outcome = store
        .manager()
        .ensure_ahead_for_task(template, TODAY)
        .expect("ensure should succeed");
    assert_eq!(outcome.inserted_count(), 7);
    assert_eq!(store.future(template, TODAY), 7);

    let series = db::list_series(&store.conn, template).expect("series should load");
    for occurrence in series.iter().filter(|task| task.id != template) {
        assert_eq!(occurrence.name, "Stretch");
        assert_eq!(occurrence.parent_id, Some(template));
        assert!(!occurrence.is_done);
        assert_eq!(occurrence.recurrence_type, Some(RecurrenceType::Daily));
        let reminder = occurrence.reminder.expect("reminder should be copied");
        assert_eq!(reminder.time, time!(7:15));
        assert_eq!(reminder.date, occurrence.day);
        assert!(reminder.is_enabled);
    }
}

#[test]
fn repeated_ensure_performs_no_writes() {
    let store = TestStore::open();
    let template = store.template("Journal", TODAY, Some(RecurrenceType::Daily));
    let manager = store.manager();

    manager
        .ensure_ahead_for_task(template, TODAY)
        .expect("first ensure should succeed");
    let before = db::count_tasks(&store.conn, None).expect("count");

    let second = manager
        .ensure_ahead_for_task(template, TODAY)
        .expect("second ensure should succeed");
    assert_eq!(
        second,
        AheadOutcome::AlreadySatisfied {
            existing: 7,
            target: 7
        }
    );
    assert_eq!(db::count_tasks(&store.conn, None).expect("count"), before);
}

#[test]
fn weekly_gym_gets_next_four_weekly_dates() {
    let store = TestStore::open();
    let template = store.template("Gym", TODAY, Some(RecurrenceType::Weekly));

    store
        .manager()
        .ensure_ahead_for_task(template, TODAY)
        .expect("ensure should succeed");

    assert_eq!(
        store.series_days(template),
        vec![
            TODAY,
            date!(2026 - 10 - 26),
            date!(2026 - 11 - 02),
            date!(2026 - 11 - 09),
            date!(2026 - 11 - 16),
        ]
    );
}

#[test]
fn series_with_full_look_ahead_is_left_alone() {
    let store = TestStore::open();
    let template = store.template("Gym", TODAY, Some(RecurrenceType::Weekly));
    for day in [
        date!(2026 - 10 - 26),
        date!(2026 - 11 - 02),
        date!(2026 - 11 - 09),
        date!(2026 - 11 - 16),
    ] {
        store.insert("Gym", day, Some(RecurrenceType::Weekly), None, Some(template));
    }

    let outcome = store
        .manager()
        .ensure_ahead_for_task(template, TODAY)
        .expect("ensure should succeed");
    assert_eq!(
        outcome,
        AheadOutcome::AlreadySatisfied {
            existing: 4,
            target: 4
        }
    );
    assert_eq!(store.series_days(template).len(), 5);
}

#[test]
fn generation_stops_at_recurrence_end_date() {
    let store = TestStore::open();
    let end = date!(2026 - 10 - 22);
    let template = store.insert("Course", TODAY, Some(RecurrenceType::Daily), Some(end), None);

    let outcome = store
        .manager()
        .ensure_ahead_for_task(template, TODAY)
        .expect("ensure should succeed");
    assert_eq!(outcome.inserted_count(), 3);
    assert_eq!(store.series_days(template).last(), Some(&end));

    let occurrence = db::list_series(&store.conn, template).expect("series")[1].clone();
    assert_eq!(occurrence.recurrence_end_date, Some(end));
}

#[test]
fn day_sweep_only_touches_recurring_tasks() {
    let store = TestStore::open();
    let weekly = store.template("Gym", TODAY, Some(RecurrenceType::Weekly));
    let plain = store.template("Dentist", TODAY, None);
    let untyped = db::insert_task(
        &store.conn,
        &NewTaskRow {
            created_at: TODAY,
            name: "Half configured",
            day: TODAY,
            position: 3,
            is_recurring: true,
            recurrence_type: None,
            recurrence_end_date: None,
            parent_id: None,
        },
    )
    .expect("insert should succeed");

    let summary = store
        .manager()
        .ensure_ahead_for_day(TODAY, TODAY)
        .expect("sweep should succeed");
    assert_eq!(summary.examined, 1);
    assert_eq!(summary.series_extended, 1);
    assert_eq!(summary.inserted, 4);

    assert_eq!(store.series_days(weekly).len(), 5);
    assert_eq!(store.series_days(plain), vec![TODAY]);
    assert_eq!(store.series_days(untyped), vec![TODAY]);
}

#[test]
fn occurrence_trigger_tops_up_from_its_own_day() {
    let store = TestStore::open();
    let template = store.template("Walk", TODAY, Some(RecurrenceType::Daily));
    let manager = store.manager();
    manager
        .ensure_ahead_for_task(template, TODAY)
        .expect("initial ensure should succeed");

    let tomorrow = date!(2026 - 10 - 20);
    let occurrence = db::list_tasks(&store.conn, Some(tomorrow)).expect("list")[0].id;
    let outcome = manager
        .ensure_ahead_for_task(occurrence, tomorrow)
        .expect("occurrence ensure should succeed");

    let inserted = match outcome {
        AheadOutcome::Populated { inserted } => inserted,
        other => panic!("expected population, got {other:?}"),
    };
    assert_eq!(inserted.len(), 1);
    let added = db::get_task(&store.conn, inserted[0])
        .expect("read")
        .expect("row exists");
    assert_eq!(added.day, date!(2026 - 10 - 27));
    assert_eq!(added.parent_id, Some(template));
    assert_eq!(store.future(template, tomorrow), 7);
}

#[test]
fn deleted_occurrence_is_not_resurrected() {
    let store = TestStore::open();
    let template = store.template("Walk", TODAY, Some(RecurrenceType::Daily));
    let manager = store.manager();
    manager
        .ensure_ahead_for_task(template, TODAY)
        .expect("initial ensure should succeed");

    let removed_day = date!(2026 - 10 - 22);
    let removed = db::list_tasks(&store.conn, Some(removed_day)).expect("list")[0].id;
    db::delete_task(&store.conn, removed).expect("delete should succeed");

    manager
        .ensure_ahead_for_task(template, TODAY)
        .expect("top-up should succeed");
    let days = store.series_days(template);
    assert!(!days.contains(&removed_day));
    assert_eq!(days.last(), Some(&date!(2026 - 10 - 27)));
    assert_eq!(store.future(template, TODAY), 7);
}

#[test]
fn monthly_series_follows_template_day_of_month() {
    let store = TestStore::open();
    let anchor = date!(2026 - 01 - 31);
    let template = store.template("Rent", anchor, Some(RecurrenceType::Monthly));

    store
        .manager()
        .ensure_ahead_for_task(template, anchor)
        .expect("ensure should succeed");
    assert_eq!(
        store.series_days(template),
        vec![
            anchor,
            date!(2026 - 02 - 28),
            date!(2026 - 03 - 31),
            date!(2026 - 04 - 30),
        ]
    );
}

#[test]
fn non_recurring_and_missing_tasks_are_benign() {
    let store = TestStore::open();
    let plain = store.template("Call mom", TODAY, None);
    let manager = store.manager();

    assert_eq!(
        manager
            .ensure_ahead_for_task(plain, TODAY)
            .expect("ensure should succeed"),
        AheadOutcome::NotRecurring
    );
    assert_eq!(
        manager
            .ensure_ahead_for_task(9_999, TODAY)
            .expect("ensure should succeed"),
        AheadOutcome::NotRecurring
    );

    let err = populate_recurring_tasks(
        &store.conn,
        PopulateParams {
            task_id: plain,
            drop: 0,
        },
        &LookAhead::default(),
        TODAY,
    )
    .expect_err("plain task cannot be populated");
    assert!(matches!(err, PopulateError::NotRecurringTask(id) if id == plain));
}

#[test]
fn failed_population_leaves_no_partial_rows() {
    let store = TestStore::open();
    let template = store.template("Meditate", TODAY, Some(RecurrenceType::Daily));
    store
        .conn
        .execute_batch(
            r#"
CREATE TRIGGER fail_fourth_day BEFORE INSERT ON task
WHEN NEW.day = '2026-10-23'
BEGIN
    SELECT RAISE(ABORT, 'disk full');
END;
"#,
        )
        .expect("trigger should install");

    let err = store
        .manager()
        .ensure_ahead_for_task(template, TODAY)
        .expect_err("population should fail");
    assert!(matches!(
        err,
        RecurrenceError::Populate(PopulateError::Unknown(_))
    ));
    assert_eq!(store.series_days(template), vec![TODAY]);
    assert!(db::get_lease(&store.conn, template)
        .expect("lease read")
        .is_none());
}

#[test]
fn busy_series_surfaces_lease_error() {
    let store = TestStore::open();
    let template = store.template("Gym", TODAY, Some(RecurrenceType::Weekly));
    let other = db::open_connection(&store.path).expect("second connection should open");
    let _held = SeriesLease::acquire(&other, template, Duration::from_secs(30), Duration::ZERO)
        .expect("lease should be granted");

    let manager = RecurrenceManager::new(
        &store.conn,
        LookAhead::default(),
        &LeaseConfig {
            ttl_secs: 30,
            wait_ms: 20,
        },
    );
    let err = manager
        .ensure_ahead_for_task(template, TODAY)
        .expect_err("busy series should fail");
    assert!(matches!(
        err,
        RecurrenceError::Lease(LeaseError::Busy(id)) if id == template
    ));
    assert_eq!(store.series_days(template), vec![TODAY]);
}
