use std::thread;
use std::time::Duration;

use skv_client::{ClientError, Connection, Lookup, MockStore, Stage, Ttl};

#[test]
fn empty_pipeline_is_a_noop() {
    let mock = MockStore::new();
    let mut conn = mock.connection();
    let pipeline = conn.pipeline();
    assert!(pipeline.is_empty());
    pipeline.execute().expect("execute");
    assert_eq!(mock.num_keys(), 0);
}

#[test]
fn results_follow_enqueue_order_across_kinds() {
    let mock = MockStore::new();
    mock.with_int("n", 4, Ttl::NONE).with_string("s", "text", Ttl::from_secs(30));
    let mut conn = mock.connection();

    let mut pipeline = conn.pipeline();
    let first = pipeline.get_int("n");
    let text = pipeline.get_string("s");
    let counter = pipeline.incr_by("n", 6);
    let after = pipeline.get_int("n");
    let ttl = pipeline.get_expire("s");
    let present = pipeline.exists("s");
    let removed = pipeline.delete("s");
    let gone = pipeline.exists("s");
    pipeline.execute().expect("execute");

    assert_eq!(first.value(), Lookup::found(4));
    assert_eq!(text.value(), Lookup::found("text".to_string()));
    assert_eq!(counter.value(), 10);
    assert_eq!(after.value(), Lookup::found(10));
    assert_eq!(ttl.value(), 30);
    assert!(present.value());
    assert_eq!(removed.value(), 1);
    assert!(!gone.value());
}

#[test]
fn reads_are_idempotent() {
    let mock = MockStore::new();
    mock.with_string("k", "v", Ttl::NONE);
    let mut conn = mock.connection();

    let mut pipeline = conn.pipeline();
    let a = pipeline.get_string("k");
    let b = pipeline.get_string("k");
    pipeline.execute().expect("execute");
    assert_eq!(a.value(), b.value());

    assert_eq!(conn.get_string("k").expect("get"), Some("v".to_string()));
    assert_eq!(conn.get_string("k").expect("get"), Some("v".to_string()));
}

#[test]
fn set_then_get_across_two_pipelines() {
    let mock = MockStore::new();
    let mut conn = mock.connection();

    let mut writes = conn.pipeline();
    writes.set_int("n", 42, Ttl::NONE);
    writes.set_string("s", "hello", Ttl::NONE);
    writes.execute().expect("writes");

    let mut reads = conn.pipeline();
    let n = reads.get_int("n");
    let s = reads.get_string("s");
    reads.execute().expect("reads");

    assert_eq!(n.value(), Lookup::found(42));
    assert_eq!(s.value(), Lookup::found("hello".to_string()));
}

#[test]
fn set_then_get_within_one_pipeline() {
    let mock = MockStore::new();
    let mut conn = mock.connection();

    let mut pipeline = conn.pipeline();
    pipeline.set_int("n", 7, Ttl::NONE);
    let n = pipeline.get_int("n");
    pipeline.execute().expect("execute");

    assert_eq!(n.value(), Lookup::found(7));
}

#[test]
fn missing_reads_are_not_errors() {
    let mock = MockStore::new();
    let mut conn = mock.connection();

    let mut pipeline = conn.pipeline();
    let n = pipeline.get_int("nothing");
    let s = pipeline.get_string("nothing");
    pipeline.execute().expect("execute");

    assert_eq!(n.value(), Lookup { value: 0, found: false });
    assert_eq!(s.value(), Lookup { value: String::new(), found: false });
    assert_eq!(conn.get_int("nothing").expect("get"), None);
}

#[test]
fn incr_by_on_absent_key_returns_delta() {
    let mock = MockStore::new();
    let mut conn = mock.connection();

    assert_eq!(conn.incr_by("c", 5).expect("incr"), 5);
    assert_eq!(conn.incr_by("c", -2).expect("incr"), 3);
    assert_eq!(mock.expire_time("c"), Some(0));
}

#[test]
fn ttl_writes_expire_with_the_clock() {
    let mock = MockStore::new();
    mock.set_now(1_000);
    let mut conn = mock.connection();

    conn.set_int("n", 1, Ttl::from_secs(10)).expect("set");
    assert_eq!(mock.expire_time("n"), Some(1_010));
    assert_eq!(conn.get_expire("n").expect("ttl"), 10);

    mock.advance(10);
    assert_eq!(conn.get_int("n").expect("get"), None);
    assert_eq!(mock.num_keys(), 0);
}

#[test]
fn set_expire_extends_and_clears() {
    let mock = MockStore::new();
    mock.with_int("n", 1, Ttl::from_secs(5));
    let mut conn = mock.connection();

    conn.set_expire("n", Ttl::from_secs(60)).expect("expire");
    assert_eq!(mock.expire_time("n"), Some(60));

    conn.set_expire("n", Ttl::NONE).expect("persist");
    assert_eq!(mock.expire_time("n"), Some(0));
    assert_eq!(conn.get_expire("n").expect("ttl"), 0);
}

#[test]
fn set_expire_on_missing_key_fails() {
    let mock = MockStore::new();
    let mut conn = mock.connection();

    let err = conn.set_expire("gone", Ttl::from_secs(5)).unwrap_err();
    assert!(matches!(err, ClientError::MissingKey { ref key } if key == "gone"));
}

#[test]
fn clearing_expiry_of_missing_key_fails() {
    let mock = MockStore::new();
    mock.with_int("kept", 1, Ttl::NONE);
    let mut conn = mock.connection();

    let err = conn.set_expire("gone", Ttl::NONE).unwrap_err();
    assert!(matches!(err, ClientError::MissingKey { ref key } if key == "gone"));

    // A key that exists but has no expiry is fine.
    conn.set_expire("kept", Ttl::NONE).expect("persist");

    let mut pipeline = conn.pipeline();
    pipeline.set_expire("kept", Ttl::NONE);
    pipeline.set_expire("gone", Ttl::NONE);
    let err = pipeline.execute().unwrap_err();
    assert!(matches!(err, ClientError::Pipeline { step: 1, command: "PERSIST", .. }));
    assert!(matches!(err.root(), ClientError::MissingKey { .. }));
}

#[test]
fn delete_keys_in_a_pipeline() {
    let mock = MockStore::new();
    mock.with_int("a", 1, Ttl::NONE).with_int("b", 2, Ttl::NONE);
    let mut conn = mock.connection();

    let mut pipeline = conn.pipeline();
    let removed = pipeline.delete_keys(&["a", "b", "c"]);
    let nothing = pipeline.delete_keys(&[]);
    pipeline.execute().expect("execute");

    assert_eq!(removed.value(), 2);
    assert_eq!(nothing.value(), 0);
    assert_eq!(mock.num_keys(), 0);
}

#[test]
fn delete_counts_existing_keys() {
    let mock = MockStore::new();
    mock.with_int("a", 1, Ttl::NONE).with_int("b", 2, Ttl::NONE);
    let mut conn = mock.connection();

    assert_eq!(conn.delete(&["a", "b", "c"]).expect("delete"), 2);
    assert_eq!(conn.delete(&[]).expect("delete"), 0);
    assert_eq!(mock.num_keys(), 0);
}

#[test]
fn partial_failure_keeps_earlier_results() {
    let mock = MockStore::new();
    mock.with_int("a", 1, Ttl::NONE).with_int("b", 2, Ttl::NONE).with_int("c", 3, Ttl::NONE);
    mock.fail_on_get("b", true);
    let mut conn = mock.connection();

    let mut pipeline = conn.pipeline();
    let a = pipeline.get_int("a");
    let b = pipeline.get_int("b");
    let c = pipeline.get_int("c");
    let err = pipeline.execute().unwrap_err();

    assert!(matches!(err, ClientError::Pipeline { stage: Stage::Receive, step: 1, command: "GET", .. }));
    assert!(matches!(err.root(), ClientError::Server { .. }));
    assert_eq!(a.value(), Lookup::found(1));
    assert!(!b.is_ready());
    assert!(!c.is_ready());
    assert_eq!(c.value(), Lookup::default());

    // The connection stays usable after the abandoned run.
    mock.fail_on_get("b", false);
    assert_eq!(conn.get_int("b").expect("get"), Some(2));
}

#[test]
fn write_and_delete_faults_surface_as_server_errors() {
    let mock = MockStore::new();
    mock.fail_on_set("w", true).fail_on_del("d", true);
    let mut conn = mock.connection();

    assert!(matches!(conn.set_int("w", 1, Ttl::NONE), Err(ClientError::Server { .. })));
    assert!(matches!(conn.incr_by("w", 1), Err(ClientError::Server { .. })));
    assert!(matches!(conn.delete(&["x", "d"]), Err(ClientError::Server { .. })));
    conn.set_int("other", 1, Ttl::NONE).expect("set");
}

#[test]
fn non_integer_values_fail_to_decode() {
    let mock = MockStore::new();
    mock.with_string("s", "not a number", Ttl::NONE);
    let mut conn = mock.connection();

    assert!(matches!(conn.get_int("s"), Err(ClientError::Decode { command: "GET", .. })));
    assert!(matches!(conn.incr_by("s", 1), Err(ClientError::Server { .. })));
}

#[test]
fn connections_are_counted_until_closed() {
    let mock = MockStore::new();
    let first = mock.connection();
    let second = mock.connection();
    assert_eq!(mock.opened_connections(), 2);

    first.close();
    assert_eq!(mock.opened_connections(), 1);
    second.close();
    assert_eq!(mock.opened_connections(), 0);
}

#[test]
fn published_messages_reach_subscribers() {
    let mock = MockStore::new();
    let mut conn = mock.connection();
    let mut subscription = conn.subscribe("achannel").expect("subscribe");

    let publisher = mock.clone();
    let handle = thread::spawn(move || {
        let mut conn = publisher.connection();
        conn.publish("achannel", b"payload").expect("publish")
    });

    assert_eq!(subscription.recv().expect("recv"), b"payload".to_vec());
    assert_eq!(handle.join().expect("join"), 1);
    assert_eq!(subscription.recv_timeout(Duration::from_millis(20)).expect("recv"), None);
}
