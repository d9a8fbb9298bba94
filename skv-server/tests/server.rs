use std::net::TcpListener as StdListener;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use skv_client::{batch, snapshot, ClientConfig, ClientError, Connection, ConnectionFactory, Entity, Field, KvClient, Role, Ttl};
use skv_engine::Store;
use skv_server::serve;

/// Starts a server on an ephemeral port and returns a client for it.
fn start_server() -> KvClient {
    let listener = StdListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr").to_string();
    listener.set_nonblocking(true).expect("nonblocking");

    thread::spawn(move || {
        let runtime = tokio::runtime::Runtime::new().expect("runtime");
        runtime.block_on(async move {
            let listener = tokio::net::TcpListener::from_std(listener).expect("listener");
            let _ = serve(listener, Arc::new(Store::new())).await;
        });
    });

    let mut config = ClientConfig::new(addr);
    config.read_timeout = Some(Duration::from_secs(5));
    KvClient::with_config(config).expect("client")
}

#[derive(Debug, Default)]
struct Profile {
    name: String,
    logins: i64,
    rank: i64,
}

impl Entity for Profile {
    fn fields() -> &'static [Field<Self>] {
        static FIELDS: [Field<Profile>; 3] = [
            Field::string("name", |p: &Profile| p.name.clone(), |p: &mut Profile, v: String| p.name = v)
                .with_role(Role::Read),
            Field::int("logins", |p: &Profile| p.logins, |p: &mut Profile, v: i64| p.logins = v)
                .with_role(Role::Increment),
            Field::int("rank", |p: &Profile| p.rank, |p: &mut Profile, v: i64| p.rank = v).with_role(Role::Write),
        ];
        &FIELDS
    }
}

#[test]
fn single_shot_operations_over_tcp() {
    let client = start_server();
    let mut conn = client.connection().expect("connection");

    conn.set_string("greeting", "hello", Ttl::NONE).expect("set");
    assert_eq!(conn.get_string("greeting").expect("get").as_deref(), Some("hello"));
    assert_eq!(conn.get_string("absent").expect("get"), None);
    assert!(conn.exists("greeting").expect("exists"));

    assert_eq!(conn.incr_by("hits", 4).expect("incr"), 4);
    assert_eq!(conn.incr_by("hits", -1).expect("incr"), 3);
    assert_eq!(conn.get_int("hits").expect("get"), Some(3));

    conn.set_expire("hits", Ttl::from_secs(100)).expect("expire");
    let remaining = conn.get_expire("hits").expect("ttl");
    assert!((99..=100).contains(&remaining), "remaining = {remaining}");
    conn.set_expire("hits", Ttl::NONE).expect("persist");
    assert_eq!(conn.get_expire("hits").expect("ttl"), 0);

    assert_eq!(conn.delete(&["greeting", "hits", "absent"]).expect("delete"), 2);
    assert!(!conn.exists("greeting").expect("exists"));
}

#[test]
fn expire_on_missing_key_reports_the_key() {
    let client = start_server();
    let mut conn = client.connection().expect("connection");

    let err = conn.set_expire("ghost", Ttl::from_secs(5)).unwrap_err();
    assert!(matches!(err, ClientError::MissingKey { ref key } if key == "ghost"));
    let err = conn.set_expire("ghost", Ttl::NONE).unwrap_err();
    assert!(matches!(err, ClientError::MissingKey { ref key } if key == "ghost"));

    // The connection stays usable after a per-command failure.
    conn.set_int("n", 1, Ttl::NONE).expect("set");
    assert_eq!(conn.get_int("n").expect("get"), Some(1));
}

#[test]
fn pipeline_replies_arrive_in_order() {
    let client = start_server();
    let mut conn = client.connection().expect("connection");

    let mut pipeline = conn.pipeline();
    pipeline.set_int("a", 10, Ttl::from_secs(60));
    let a = pipeline.get_int("a");
    let bumped = pipeline.incr_by("a", 5);
    let missing = pipeline.get_string("b");
    let ttl = pipeline.get_expire("a");
    pipeline.execute().expect("execute");

    assert_eq!(a.value().into_option(), Some(10));
    assert_eq!(bumped.value(), 15);
    assert!(!missing.value().found);
    assert!((59..=60).contains(&ttl.value()));
}

#[test]
fn wrong_type_fails_the_whole_pipeline() {
    let client = start_server();
    let mut conn = client.connection().expect("connection");
    conn.set_string("word", "abc", Ttl::NONE).expect("set");

    let mut pipeline = conn.pipeline();
    pipeline.set_int("x", 1, Ttl::NONE);
    pipeline.incr_by("word", 1);
    let err = pipeline.execute().unwrap_err();

    assert!(matches!(err, ClientError::Pipeline { step: 1, .. }));
    assert!(matches!(err.root(), ClientError::Server { .. }));
    drop(conn);

    // The out-of-sync connection was discarded; a new one works.
    let mut conn = client.connection().expect("connection");
    assert_eq!(conn.get_int("x").expect("get"), Some(1));
}

#[test]
fn mapper_round_trips_over_tcp() {
    let client = start_server();
    let mut conn = client.connection().expect("connection");
    conn.set_string("u1.name", "ann", Ttl::NONE).expect("seed");
    conn.set_int("u1.logins", 2, Ttl::NONE).expect("seed");

    let mut profile = Profile {
        logins: 1,
        rank: 7,
        ..Profile::default()
    };
    snapshot(&mut conn, "u1", &mut profile, Ttl::from_secs(300)).expect("snapshot");

    assert_eq!(profile.name, "ann");
    assert_eq!(profile.logins, 3);
    assert_eq!(profile.rank, 7);
    assert!(conn.get_expire("u1.logins").expect("ttl") > 0);

    let mut first = Profile::default();
    let mut second = Profile::default();
    batch(&mut conn, [("u1", &mut first), ("u2", &mut second)]).expect("batch");

    assert_eq!(first.name, "ann");
    assert_eq!(first.logins, 3);
    assert_eq!(first.rank, 7);
    assert_eq!(second.name, "");
    assert_eq!(second.rank, 0);
}

#[test]
fn subscriber_receives_published_messages() {
    let client = start_server();
    let mut subscriber = client.connection().expect("connection");
    let mut subscription = subscriber.subscribe("news").expect("subscribe");
    assert_eq!(subscription.channel(), "news");

    let mut publisher = client.connection().expect("connection");
    assert_eq!(publisher.publish("news", b"first").expect("publish"), 1);
    assert_eq!(publisher.publish("other", b"ignored").expect("publish"), 0);
    assert_eq!(publisher.publish("news", b"second").expect("publish"), 1);

    assert_eq!(subscription.recv().expect("recv"), b"first".to_vec());
    assert_eq!(subscription.recv().expect("recv"), b"second".to_vec());
}
