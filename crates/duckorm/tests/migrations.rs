use asupersync::runtime::RuntimeBuilder;
use duckorm::prelude::*;
use duckorm::{MigrationFuture, SqliteConnection};

fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

fn session() -> Session<SqliteConnection> {
    Session::new(
        SqliteConnection::open_memory().expect("open database"),
        SchemaRegistry::new(),
    )
    .expect("create session")
}

fn tags() -> SqlMigration {
    SqlMigration::new("0001_tags")
        .up("CREATE TABLE tags (id INTEGER PRIMARY KEY, label TEXT);")
        .down("DROP TABLE tags;")
}

fn notes() -> SqlMigration {
    SqlMigration::new("0002_notes")
        .up("CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT);")
        .down("DROP TABLE notes;")
}

async fn tables(cx: &Cx, session: &Session<SqliteConnection>) -> Vec<String> {
    unwrap_outcome(session.find_all_tables(cx).await)
}

#[test]
fn run_pending_is_idempotent() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let session = session();
    let runner = MigrationRunner::new().unwrap().add(tags()).add(notes());

    rt.block_on(async {
        let applied = unwrap_outcome(runner.run_pending(&cx, &session).await);
        assert_eq!(applied, vec!["0001_tags", "0002_notes"]);

        let again = unwrap_outcome(runner.run_pending(&cx, &session).await);
        assert!(again.is_empty());

        let recorded = unwrap_outcome(runner.applied(&cx, &session).await);
        let names: Vec<&str> = recorded.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["0001_tags", "0002_notes"]);
        assert!(recorded.iter().all(|m| m.applied_at > 0));

        let tables = tables(&cx, &session).await;
        for table in ["duckorm_migrations", "tags", "notes"] {
            assert!(tables.iter().any(|t| t == table), "missing {table}");
        }
    });
}

#[test]
fn later_registrations_are_picked_up() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let session = session();

    rt.block_on(async {
        let first = MigrationRunner::new().unwrap().add(tags());
        unwrap_outcome(first.run_pending(&cx, &session).await);

        let second = MigrationRunner::new().unwrap().add(tags()).add(notes());
        assert_eq!(unwrap_outcome(second.pending(&cx, &session).await), vec!["0002_notes"]);
        assert_eq!(unwrap_outcome(second.run_pending(&cx, &session).await), vec!["0002_notes"]);
    });
}

#[test]
fn rollback_last_reverts_newest() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let session = session();
    let runner = MigrationRunner::new().unwrap().add(tags()).add(notes());

    rt.block_on(async {
        unwrap_outcome(runner.run_pending(&cx, &session).await);

        let reverted = unwrap_outcome(runner.rollback_last(&cx, &session).await);
        assert_eq!(reverted.as_deref(), Some("0002_notes"));
        assert!(!tables(&cx, &session).await.iter().any(|t| t == "notes"));
        assert_eq!(unwrap_outcome(runner.pending(&cx, &session).await), vec!["0002_notes"]);

        assert_eq!(
            unwrap_outcome(runner.rollback_last(&cx, &session).await).as_deref(),
            Some("0001_tags")
        );
        assert_eq!(unwrap_outcome(runner.rollback_last(&cx, &session).await), None);
    });
}

#[test]
fn failing_migration_stops_the_run() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let session = session();
    let broken = SqlMigration::new("0002_broken").up("CREATE TABLE (;");
    let runner = MigrationRunner::new().unwrap().add(tags()).add(broken).add(notes());

    rt.block_on(async {
        match runner.run_pending(&cx, &session).await {
            Outcome::Err(Error::Query(q)) => assert_eq!(q.kind, duckorm::QueryErrorKind::Syntax),
            Outcome::Err(e) => panic!("unexpected error: {e}"),
            _ => panic!("expected the broken migration to fail"),
        }
        let recorded = unwrap_outcome(runner.applied(&cx, &session).await);
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].name, "0001_tags");
    });
}

#[test]
fn duplicate_names_are_rejected() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let session = session();
    let runner = MigrationRunner::new().unwrap().add(tags()).add(tags());

    rt.block_on(async {
        match runner.run_pending(&cx, &session).await {
            Outcome::Err(Error::Custom(message)) => assert!(message.contains("0001_tags")),
            Outcome::Err(e) => panic!("unexpected error: {e}"),
            _ => panic!("expected a duplicate-name error"),
        }
    });
}

/// A migration that goes through the session's record API instead of raw SQL.
struct SeedCities;

impl Migration<SqliteConnection> for SeedCities {
    fn name(&self) -> &str {
        "0003_seed_cities"
    }

    fn up<'a>(&'a self, cx: &'a Cx, session: &'a Session<SqliteConnection>) -> MigrationFuture<'a> {
        Box::pin(async move {
            for name in ["Natal", "Recife"] {
                if let Outcome::Err(e) = session.save(cx, Record::new("cities").with("name", name)).await {
                    return Outcome::Err(e);
                }
            }
            Outcome::Ok(())
        })
    }

    fn down<'a>(&'a self, cx: &'a Cx, session: &'a Session<SqliteConnection>) -> MigrationFuture<'a> {
        Box::pin(async move {
            match session.delete(cx, "cities", &[Condition::is_in("name", vec!["Natal", "Recife"])]).await {
                Outcome::Ok(_) => Outcome::Ok(()),
                Outcome::Err(e) => Outcome::Err(e),
                Outcome::Cancelled(r) => Outcome::Cancelled(r),
                Outcome::Panicked(p) => Outcome::Panicked(p),
            }
        })
    }
}

#[test]
fn custom_migration_uses_session_records() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    let mut registry = SchemaRegistry::new();
    registry
        .register(
            Schema::builder("City")
                .table("cities")
                .column(Column::integer("id").primary_key(true).auto_increment(true))
                .column(Column::string("name"))
                .build()
                .unwrap(),
        )
        .unwrap();
    let session = Session::new(SqliteConnection::open_memory().unwrap(), registry).unwrap();
    let runner = MigrationRunner::new().unwrap().add(SeedCities);

    rt.block_on(async {
        unwrap_outcome(session.create_all(&cx).await);
        unwrap_outcome(runner.run_pending(&cx, &session).await);
        let cities = unwrap_outcome(session.find_all(&cx, "cities", &Select::new()).await);
        assert_eq!(cities.len(), 2);

        unwrap_outcome(runner.rollback_last(&cx, &session).await);
        let cities = unwrap_outcome(session.find_all(&cx, "cities", &Select::new()).await);
        assert!(cities.is_empty());
    });
}
