use rusqlite::Connection;
use stackstore_core::db::migrations::latest_version;
use stackstore_core::db::open_db_in_memory;
use stackstore_core::{
    Direction, ErrorKind, Neighbor, RepoError, SqliteStackRepository, StackRepository,
};
use uuid::Uuid;

#[test]
fn push_onto_empty_makes_entry_both_termini() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteStackRepository::try_new(&conn).unwrap();

    let id = repo.push(Some("only")).unwrap();

    let (left, right) = links_of(&conn, id);
    assert_eq!(left, Neighbor::End);
    assert_eq!(right, Neighbor::End);

    let report = repo.verify_chain().unwrap();
    assert_eq!(report.len, 1);
    assert_eq!(report.left_end, Some(id));
    assert_eq!(report.right_end, Some(id));
}

#[test]
fn forward_push_grows_the_left_end() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteStackRepository::try_new(&conn).unwrap();

    let first = repo.push(Some("first")).unwrap();
    let second = repo.push(Some("second")).unwrap();

    assert_eq!(links_of(&conn, second), (Neighbor::End, Neighbor::Ref(first)));
    assert_eq!(links_of(&conn, first), (Neighbor::Ref(second), Neighbor::End));
    assert_eq!(repo.pick().unwrap().as_deref(), Some("second"));
}

#[test]
fn reversed_push_grows_the_right_end() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteStackRepository::try_new(&conn).unwrap();
    repo.load_configuration().unwrap();

    let first = repo.push(Some("first")).unwrap();
    assert_eq!(repo.reverse().unwrap(), Some(Direction::Reversed));
    let second = repo.push(Some("second")).unwrap();

    assert_eq!(links_of(&conn, second), (Neighbor::Ref(first), Neighbor::End));
    assert_eq!(links_of(&conn, first), (Neighbor::End, Neighbor::Ref(second)));
    assert_eq!(repo.pick().unwrap().as_deref(), Some("second"));
    assert_eq!(repo.verify_chain().unwrap().len, 2);
}

#[test]
fn push_rejects_absent_content_but_accepts_empty_string() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteStackRepository::try_new(&conn).unwrap();

    let err = repo.push(None).unwrap_err();
    assert!(matches!(err, RepoError::InvalidInput(_)));
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(repo.entry_count().unwrap(), 0);

    repo.push(Some("")).unwrap();
    assert_eq!(repo.pick().unwrap(), Some(String::new()));
    assert_eq!(repo.pop().unwrap(), Some(String::new()));
    assert_eq!(repo.pop().unwrap(), None);
}

#[test]
fn pop_promotes_neighbor_to_terminus_and_deletes_record() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteStackRepository::try_new(&conn).unwrap();

    let bottom = repo.push(Some("bottom")).unwrap();
    let middle = repo.push(Some("middle")).unwrap();
    let top = repo.push(Some("top")).unwrap();

    assert_eq!(repo.pop().unwrap().as_deref(), Some("top"));

    assert!(!entry_exists(&conn, top));
    assert_eq!(links_of(&conn, middle), (Neighbor::End, Neighbor::Ref(bottom)));
    assert_eq!(repo.entry_count().unwrap(), 2);
    assert_eq!(repo.verify_chain().unwrap().len, 2);
}

#[test]
fn pop_of_last_entry_clears_both_termini() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteStackRepository::try_new(&conn).unwrap();

    repo.push(Some("solo")).unwrap();
    assert_eq!(repo.pop().unwrap().as_deref(), Some("solo"));

    let report = repo.verify_chain().unwrap();
    assert_eq!(report.len, 0);
    assert_eq!(report.left_end, None);
    assert_eq!(report.right_end, None);

    let id = repo.push(Some("again")).unwrap();
    assert_eq!(links_of(&conn, id), (Neighbor::End, Neighbor::End));
}

#[test]
fn reverse_touches_only_the_configuration_row() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteStackRepository::try_new(&conn).unwrap();

    let a = repo.push(Some("a")).unwrap();
    let b = repo.push(Some("b")).unwrap();
    let before = (links_of(&conn, a), links_of(&conn, b));

    assert_eq!(repo.reverse().unwrap(), Some(Direction::Reversed));
    assert_eq!(repo.reverse().unwrap(), Some(Direction::Forward));
    assert_eq!(repo.reverse().unwrap(), Some(Direction::Reversed));

    assert_eq!((links_of(&conn, a), links_of(&conn, b)), before);
    assert_eq!(stored_direction(&conn).as_deref(), Some("reversed"));
    assert_eq!(repo.pick().unwrap().as_deref(), Some("a"));
}

#[test]
fn reverse_on_empty_stack_writes_nothing() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteStackRepository::try_new(&conn).unwrap();
    repo.load_configuration().unwrap();

    assert_eq!(repo.reverse().unwrap(), None);
    assert_eq!(stored_direction(&conn).as_deref(), Some("forward"));
}

#[test]
fn load_configuration_creates_default_once() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteStackRepository::try_new(&conn).unwrap();

    assert_eq!(stored_direction(&conn), None);
    assert_eq!(repo.load_configuration().unwrap().direction, Direction::Forward);

    repo.push(Some("x")).unwrap();
    repo.reverse().unwrap();
    assert_eq!(repo.load_configuration().unwrap().direction, Direction::Reversed);

    let rows: i64 = conn
        .query_row("SELECT COUNT(*) FROM stack_config;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(rows, 1);
}

#[test]
fn failed_push_rolls_back_every_record() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteStackRepository::try_new(&conn).unwrap();
    repo.push(Some("a")).unwrap();
    repo.push(Some("b")).unwrap();

    // Fails the relink of the previous terminus, after the new row is inserted.
    conn.execute_batch(
        "CREATE TRIGGER reject_relink BEFORE UPDATE OF left_kind ON stack_entries
         WHEN NEW.left_kind = 'ref'
         BEGIN SELECT RAISE(ABORT, 'relink rejected'); END;",
    )
    .unwrap();

    let err = repo.push(Some("c")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PersistenceFailure);

    assert_eq!(repo.entry_count().unwrap(), 2);
    assert_eq!(repo.verify_chain().unwrap().len, 2);
    assert_eq!(repo.pick().unwrap().as_deref(), Some("b"));
}

#[test]
fn failed_pop_keeps_popped_entry_and_terminus() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteStackRepository::try_new(&conn).unwrap();
    repo.push(Some("a")).unwrap();
    repo.push(Some("b")).unwrap();

    // Fails the promotion, after the popped row is deleted.
    conn.execute_batch(
        "CREATE TRIGGER reject_promotion BEFORE UPDATE OF left_kind ON stack_entries
         WHEN NEW.left_kind = 'end'
         BEGIN SELECT RAISE(ABORT, 'promotion rejected'); END;",
    )
    .unwrap();

    let err = repo.pop().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PersistenceFailure);

    assert_eq!(repo.entry_count().unwrap(), 2);
    assert_eq!(repo.verify_chain().unwrap().len, 2);
    assert_eq!(repo.pick().unwrap().as_deref(), Some("b"));
}

#[test]
fn verify_chain_detects_dangling_link() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteStackRepository::try_new(&conn).unwrap();
    let bottom = repo.push(Some("bottom")).unwrap();
    repo.push(Some("top")).unwrap();

    conn.execute(
        "UPDATE stack_entries SET right_ref = ?1 WHERE entry_id != ?2;",
        [Uuid::new_v4().to_string(), bottom.to_string()],
    )
    .unwrap();

    let err = repo.verify_chain().unwrap_err();
    assert!(matches!(err, RepoError::BrokenChain(_)));
}

#[test]
fn pick_reports_broken_chain_instead_of_empty() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteStackRepository::try_new(&conn).unwrap();
    repo.push(Some("orphan")).unwrap();

    conn.execute(
        "UPDATE stack_entries SET left_kind = 'unset';",
        [],
    )
    .unwrap();

    let err = repo.pick().unwrap_err();
    assert!(matches!(err, RepoError::BrokenChain(_)));
    let err = repo.pop().unwrap_err();
    assert!(matches!(err, RepoError::BrokenChain(_)));
}

#[test]
fn invalid_persisted_direction_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteStackRepository::try_new(&conn).unwrap();
    repo.push(Some("x")).unwrap();

    conn.execute_batch(
        "DROP TABLE stack_config;
         CREATE TABLE stack_config (
            config_id INTEGER PRIMARY KEY NOT NULL,
            direction TEXT NOT NULL
         );
         INSERT INTO stack_config (config_id, direction) VALUES (1, 'sideways');",
    )
    .unwrap();

    let err = repo.pick().unwrap_err();
    assert!(matches!(err, RepoError::InvalidData(_)));
}

#[test]
fn repository_rejects_uninitialized_connection() {
    let conn = Connection::open_in_memory().unwrap();

    match SqliteStackRepository::try_new(&conn) {
        Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version: 0,
        }) => assert_eq!(expected_version, latest_version()),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("expected uninitialized connection error"),
    }
}

#[test]
fn repository_rejects_connection_without_required_table() {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(&format!("PRAGMA user_version = {};", latest_version()))
        .unwrap();

    let result = SqliteStackRepository::try_new(&conn);
    assert!(matches!(
        result,
        Err(RepoError::MissingRequiredTable("stack_entries"))
    ));
}

#[test]
fn repository_rejects_connection_missing_required_column() {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TABLE stack_entries (
            entry_id TEXT PRIMARY KEY NOT NULL,
            content TEXT NOT NULL,
            left_kind TEXT NOT NULL,
            right_kind TEXT NOT NULL
        );",
    )
    .unwrap();
    conn.execute_batch(&format!("PRAGMA user_version = {};", latest_version()))
        .unwrap();

    let result = SqliteStackRepository::try_new(&conn);
    assert!(matches!(
        result,
        Err(RepoError::MissingRequiredColumn {
            table: "stack_entries",
            column: "left_ref"
        })
    ));
}

fn links_of(conn: &Connection, id: Uuid) -> (Neighbor, Neighbor) {
    let (left_kind, left_ref, right_kind, right_ref): (
        String,
        Option<String>,
        String,
        Option<String>,
    ) = conn
        .query_row(
            "SELECT left_kind, left_ref, right_kind, right_ref
             FROM stack_entries WHERE entry_id = ?1;",
            [id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .unwrap();
    (
        to_neighbor(&left_kind, left_ref),
        to_neighbor(&right_kind, right_ref),
    )
}

fn to_neighbor(kind: &str, reference: Option<String>) -> Neighbor {
    match kind {
        "end" => Neighbor::End,
        "unset" => Neighbor::Unset,
        "ref" => Neighbor::Ref(Uuid::parse_str(&reference.unwrap()).unwrap()),
        other => panic!("unexpected link kind {other}"),
    }
}

fn entry_exists(conn: &Connection, id: Uuid) -> bool {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM stack_entries WHERE entry_id = ?1);",
            [id.to_string()],
            |row| row.get(0),
        )
        .unwrap();
    exists == 1
}

fn stored_direction(conn: &Connection) -> Option<String> {
    conn.query_row(
        "SELECT direction FROM stack_config WHERE config_id = 1;",
        [],
        |row| row.get(0),
    )
    .ok()
}
