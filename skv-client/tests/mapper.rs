use skv_client::{
    batch, snapshot, snapshot_with, Batch, ClientError, ClientResult, Connection, Entity, Field, MockConnection,
    MockStore, Pipeline, Role, SnapshotOptions, Subscription, Ttl, WritePolicy,
};

/// Connection wrapper counting how many pipelines were started.
struct Counting {
    inner: MockConnection,
    pipelines: usize,
}

impl Counting {
    fn new(mock: &MockStore) -> Self {
        Counting {
            inner: mock.connection(),
            pipelines: 0,
        }
    }
}

impl Connection for Counting {
    fn pipeline(&mut self) -> Pipeline<'_> {
        self.pipelines += 1;
        self.inner.pipeline()
    }

    fn subscribe(&mut self, channel: &str) -> ClientResult<Subscription> {
        self.inner.subscribe(channel)
    }
}

#[derive(Debug, Default, PartialEq)]
struct Doc {
    field1: String,
    field2: i64,
    // Not described, so never touched.
    field3: i64,
}

impl Entity for Doc {
    fn fields() -> &'static [Field<Self>] {
        static FIELDS: [Field<Doc>; 2] = [
            Field::string("field1", |d: &Doc| d.field1.clone(), |d: &mut Doc, v: String| d.field1 = v),
            Field::int("field2", |d: &Doc| d.field2, |d: &mut Doc, v: i64| d.field2 = v),
        ];
        &FIELDS
    }
}

#[derive(Debug, Default)]
struct Session {
    user: String,
    visits: i64,
    score: i64,
    label: String,
    note: String,
}

impl Entity for Session {
    fn fields() -> &'static [Field<Self>] {
        static FIELDS: [Field<Session>; 5] = [
            Field::string("user", |s: &Session| s.user.clone(), |s: &mut Session, v: String| s.user = v)
                .with_role(Role::Read),
            Field::int("visits", |s: &Session| s.visits, |s: &mut Session, v: i64| s.visits = v)
                .with_role(Role::Increment),
            Field::int("score", |s: &Session| s.score, |s: &mut Session, v: i64| s.score = v).with_role(Role::Write),
            Field::string("label", |s: &Session| s.label.clone(), |s: &mut Session, v: String| s.label = v)
                .with_role(Role::Write),
            // Described but without a role: batches read it, snapshots skip it.
            Field::string("note", |s: &Session| s.note.clone(), |s: &mut Session, v: String| s.note = v),
        ];
        &FIELDS
    }
}

struct Broken;

impl Entity for Broken {
    fn fields() -> &'static [Field<Self>] {
        static FIELDS: [Field<Broken>; 2] = [
            Field::int("x", |_: &Broken| 1, |_: &mut Broken, _: i64| {}).with_role(Role::Write),
            Field::int("x", |_: &Broken| 1, |_: &mut Broken, _: i64| {}).with_role(Role::Write),
        ];
        &FIELDS
    }
}

fn seeded_docs() -> MockStore {
    let mock = MockStore::new();
    mock.with_string("doc1.field1", "11", Ttl::from_secs(10))
        .with_int("doc1.field2", 12, Ttl::from_secs(10))
        .with_string("doc2.field1", "21", Ttl::from_secs(10))
        .with_int("doc2.field2", 22, Ttl::from_secs(10));
    mock
}

#[test]
fn batch_loads_many_entities_in_one_pipeline() {
    let mock = seeded_docs();
    let mut conn = Counting::new(&mock);

    let mut doc1 = Doc {
        field3: 7,
        ..Doc::default()
    };
    let mut doc2 = Doc::default();
    batch(&mut conn, [("doc1", &mut doc1), ("doc2", &mut doc2)]).expect("batch");

    assert_eq!(conn.pipelines, 1);
    assert_eq!(
        doc1,
        Doc {
            field1: "11".to_string(),
            field2: 12,
            field3: 7,
        }
    );
    assert_eq!(doc2.field1, "21");
    assert_eq!(doc2.field2, 22);
    assert_eq!(doc2.field3, 0);
}

#[test]
fn batch_mixes_entity_types() {
    let mock = seeded_docs();
    mock.with_string("s1.user", "ann", Ttl::NONE).with_string("s1.note", "hi", Ttl::NONE);
    let mut conn = Counting::new(&mock);

    let mut doc = Doc::default();
    let mut session = Session::default();
    {
        let mut batch = Batch::new(&mut conn);
        batch.add("doc2", &mut doc).expect("add doc");
        batch.add("s1", &mut session).expect("add session");
        assert_eq!(batch.len(), 7);
        batch.execute().expect("execute");
    }

    assert_eq!(conn.pipelines, 1);
    assert_eq!(doc.field2, 22);
    assert_eq!(session.user, "ann");
    assert_eq!(session.note, "hi");
    assert_eq!(session.visits, 0);
}

#[test]
fn batch_writes_zero_values_for_missing_keys() {
    let mock = MockStore::new();
    let mut conn = mock.connection();

    let mut doc = Doc {
        field1: "stale".to_string(),
        field2: 5,
        field3: 5,
    };
    batch(&mut conn, [("nobody", &mut doc)]).expect("batch");

    assert_eq!(doc.field1, "");
    assert_eq!(doc.field2, 0);
    assert_eq!(doc.field3, 5);
}

#[test]
fn failed_batch_leaves_entities_untouched() {
    let mock = seeded_docs();
    mock.fail_on_get("doc2.field2", true);
    let mut conn = mock.connection();

    let mut doc1 = Doc::default();
    let mut doc2 = Doc::default();
    let err = batch(&mut conn, [("doc1", &mut doc1), ("doc2", &mut doc2)]).unwrap_err();

    assert!(matches!(err, ClientError::Pipeline { step: 3, .. }));
    assert_eq!(doc1, Doc::default());
    assert_eq!(doc2, Doc::default());
}

#[test]
fn snapshot_increment_refreshes_ttl() {
    let mock = MockStore::new();
    mock.set_now(500).with_int("s1.visits", 3, Ttl::NONE);
    let mut conn = Counting::new(&mock);

    let mut session = Session {
        visits: 5,
        ..Session::default()
    };
    snapshot(&mut conn, "s1", &mut session, Ttl::from_secs(10)).expect("snapshot");

    assert_eq!(conn.pipelines, 1);
    assert_eq!(session.visits, 8);
    assert_eq!(mock.stored("s1.visits").as_deref(), Some("8"));
    assert_eq!(mock.expire_time("s1.visits"), Some(510));
}

#[test]
fn snapshot_increment_of_zero_issues_nothing() {
    let mock = MockStore::new();
    let mut conn = mock.connection();

    let mut session = Session::default();
    snapshot(&mut conn, "s1", &mut session, Ttl::from_secs(10)).expect("snapshot");

    assert_eq!(session.visits, 0);
    assert_eq!(mock.expire_time("s1.visits"), None);
}

#[test]
fn snapshot_writes_non_zero_and_reads_unset_fields() {
    let mock = MockStore::new();
    mock.set_now(100)
        .with_string("s1.user", "ann", Ttl::NONE)
        .with_string("s1.label", "stored", Ttl::NONE)
        .with_string("s1.note", "hidden", Ttl::NONE);
    let mut conn = mock.connection();

    let mut session = Session {
        score: 42,
        ..Session::default()
    };
    snapshot(&mut conn, "s1", &mut session, Ttl::from_secs(30)).expect("snapshot");

    assert_eq!(session.user, "ann");
    assert_eq!(session.score, 42);
    assert_eq!(mock.stored("s1.score").as_deref(), Some("42"));
    assert_eq!(mock.expire_time("s1.score"), Some(130));
    // Zero-valued write field falls back to the stored value.
    assert_eq!(session.label, "stored");
    // No role, no command.
    assert_eq!(session.note, "");
}

#[test]
fn snapshot_without_ttl_clears_expiry() {
    let mock = MockStore::new();
    mock.set_now(100)
        .with_int("s1.visits", 4, Ttl::from_secs(50))
        .with_int("s1.score", 1, Ttl::from_secs(50));
    let mut conn = mock.connection();

    let mut session = Session {
        visits: 1,
        score: 9,
        ..Session::default()
    };
    snapshot(&mut conn, "s1", &mut session, Ttl::NONE).expect("snapshot");

    assert_eq!(session.visits, 5);
    assert_eq!(mock.expire_time("s1.visits"), Some(0));
    assert_eq!(mock.stored("s1.score").as_deref(), Some("9"));
    assert_eq!(mock.expire_time("s1.score"), Some(0));
}

#[test]
fn skip_policy_leaves_unset_write_fields_alone() {
    let mock = MockStore::new();
    mock.with_string("s1.label", "stored", Ttl::NONE).with_int("s1.score", 9, Ttl::NONE);
    let mut conn = mock.connection();

    let mut session = Session::default();
    let options = SnapshotOptions::new(Ttl::from_secs(30)).write_policy(WritePolicy::SkipIfUnset);
    snapshot_with(&mut conn, "s1", &mut session, options).expect("snapshot");

    assert_eq!(session.label, "");
    assert_eq!(session.score, 0);
    assert_eq!(mock.stored("s1.score").as_deref(), Some("9"));
}

#[test]
fn invalid_descriptors_fail_before_any_command() {
    let mock = MockStore::new();
    let mut conn = Counting::new(&mock);

    let err = snapshot(&mut conn, "b", &mut Broken, Ttl::NONE).unwrap_err();
    assert!(matches!(err, ClientError::InvalidEntity { .. }));

    let mut broken = Broken;
    let err = batch(&mut conn, [("b", &mut broken)]).unwrap_err();
    assert!(matches!(err, ClientError::InvalidEntity { .. }));

    // The batch opened a pipeline but never executed it.
    assert_eq!(conn.pipelines, 1);
    assert_eq!(mock.num_keys(), 0);
}

#[test]
fn snapshot_propagates_store_failures() {
    let mock = MockStore::new();
    mock.fail_on_set("s1.score", true);
    let mut conn = mock.connection();

    let mut session = Session {
        score: 1,
        visits: 2,
        ..Session::default()
    };
    let err = snapshot(&mut conn, "s1", &mut session, Ttl::NONE).unwrap_err();

    assert!(matches!(err.root(), ClientError::Server { .. }));
    assert_eq!(session.visits, 2);
}
