//! Scenarios spanning several runners and every gateway

use courier_actors::Message;
use courier_config::RuntimeConfig;
use courier_e2e_tests::{echo, ring_node, Topology, Wire};
use std::time::Duration;

fn topology(prefixes: &[&str]) -> Topology<Wire> {
    Topology::build(prefixes, &RuntimeConfig::default()).unwrap()
}

#[test_log::test]
fn test_token_travels_the_ring() {
    let prefixes = ["n0", "n1", "n2"];
    let topo = topology(&prefixes);
    let inbox = topo.direct().open_inbox().unwrap();

    for (i, prefix) in prefixes.iter().enumerate() {
        let next = topo
            .runner(prefixes[(i + 1) % prefixes.len()])
            .unwrap()
            .actor_address("node");
        topo.runner(prefix)
            .unwrap()
            .add_actor(
                "node",
                ring_node(next, inbox.clone(), Duration::from_millis(5)),
                None,
            )
            .unwrap();
    }

    let first = topo.runner("n0").unwrap().actor_address("node");
    topo.direct()
        .write(Message::new(
            inbox,
            first,
            Wire::Token {
                hops: 5,
                trail: Vec::new(),
            },
        ))
        .unwrap();

    let received = topo.direct().read_payloads(1, Duration::from_secs(5));
    let expected: Vec<String> = ["n0", "n1", "n2", "n0", "n1", "n2"]
        .iter()
        .map(|p| format!("{}:node", p))
        .collect();
    assert_eq!(
        received,
        vec![Wire::Token {
            hops: 0,
            trail: expected
        }]
    );

    let report = topo.report();
    assert_eq!(report.total_delivered(), 6);
    assert_eq!(report.total_failed(), 0);
}

#[test]
fn test_echo_on_every_runner() {
    let prefixes = ["a", "b", "c", "d"];
    let topo = topology(&prefixes);
    for runner in topo.runners() {
        runner.add_actor("echo", echo, None).unwrap();
    }

    let inbox = topo.direct().open_inbox().unwrap();
    for (i, prefix) in prefixes.iter().enumerate() {
        let target = topo.runner(prefix).unwrap().actor_address("echo");
        let reply = topo
            .direct()
            .write_and_read(Message::new(inbox.clone(), target.clone(), Wire::Ping(i as u32)))
            .unwrap()
            .expect("echo reply");
        assert_eq!(reply.source(), &target);
        assert_eq!(reply.into_payload(), Wire::Ping(i as u32));
    }
}

#[test]
fn test_failing_actor_is_isolated() {
    let topo = topology(&["a", "b"]);
    let a = topo.runner("a").unwrap();
    a.add_actor("echo", echo, None).unwrap();

    // A ring node with nowhere useful to go, fed a payload it rejects
    let inbox = topo.direct().open_inbox().unwrap();
    a.add_actor(
        "strict",
        ring_node(inbox.clone(), inbox.clone(), Duration::ZERO),
        None,
    )
    .unwrap();
    topo.direct()
        .write(Message::new(
            inbox.clone(),
            a.actor_address("strict"),
            Wire::Text("not a token".into()),
        ))
        .unwrap();

    let reply = topo
        .direct()
        .write_and_read(Message::new(inbox, a.actor_address("echo"), Wire::Ping(7)))
        .unwrap();
    assert_eq!(reply.map(Message::into_payload), Some(Wire::Ping(7)));

    assert_eq!(topo.report().total_failed(), 1);
    assert_eq!(a.stats().live_actors, 1);
    assert!(!topo.wait_idle(Duration::from_millis(20)));
}

#[test]
fn test_topology_from_toml() {
    let config = RuntimeConfig::from_toml_str(
        r#"
[direct]
read_timeout_ms = 2000

[log_gateway]
level = "debug"

[timer]
worker_threads = 1
"#,
    )
    .unwrap();
    let topo: Topology<Wire> = Topology::build(&["x"], &config).unwrap();
    assert_eq!(topo.timer().prefix(), "timer");
    assert_eq!(topo.log().prefix(), "log");

    let json = topo.report().to_json().unwrap();
    assert!(json.contains("\"prefix\": \"x\""));
    topo.close();
    assert!(topo.runners().iter().all(|r| r.is_closed()));
}

#[test]
fn test_gateway_prefixes_are_reserved() {
    assert!(Topology::<Wire>::build(&["a", "timer"], &RuntimeConfig::default()).is_err());
}
