//! End-to-end tests driving the TCP and UDP servers through their clients.

use jsonrpc_reactor::rpc::{response, Handler, Reply};
use jsonrpc_reactor::transport::{Framing, TcpClient, TcpOptions, TcpServer, UdpClient, UdpServer};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn handler() -> Handler {
    let mut handler = Handler::new();
    handler
        .register("print", "Print", |request: &Value| {
            Reply::success(response::success(
                response::request_id(request),
                json!("success"),
            ))
        })
        .unwrap();
    handler
        .register(
            "notify",
            json!({"description": "Notify", "parameters": null, "returns": null}),
            |_: &Value| Reply::notification(),
        )
        .unwrap();
    handler
        .register("echo", "Echo params", |request: &Value| {
            Reply::success(response::success(
                response::request_id(request),
                request.get("params").cloned().unwrap_or(Value::Null),
            ))
        })
        .unwrap();
    handler
}

fn start_tcp(framing: Framing) -> (Arc<AtomicBool>, thread::JoinHandle<TcpServer>, TcpClient) {
    let options = TcpOptions {
        framing,
        ..TcpOptions::default()
    };
    let mut server = TcpServer::bind("127.0.0.1:0".parse().unwrap(), handler(), options).unwrap();
    server.listen().unwrap();
    let addr = server.local_addr();

    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    let handle = thread::spawn(move || {
        while !flag.load(Ordering::Relaxed) {
            server.wait_message(Some(Duration::from_millis(5))).unwrap();
        }
        server
    });

    let client = TcpClient::connect(addr, framing).unwrap();
    client
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    (stop, handle, client)
}

fn call(client: &mut TcpClient, request: &str) -> Value {
    serde_json::from_str(&client.call(request).unwrap()).unwrap()
}

#[test]
fn tcp_netstring_session() {
    let (stop, handle, mut client) = start_tcp(Framing::Netstring);

    assert_eq!(
        call(&mut client, r#"{"jsonrpc":"2.0","id":1,"method":"print"}"#),
        json!({"jsonrpc": "2.0", "id": 1, "result": "success"})
    );

    assert_eq!(
        call(&mut client, r#"{"foo":"bar"}"#),
        json!({"id": null, "jsonrpc": "2.0", "error": {"code": -32600, "message": "Invalid JSON-RPC request."}})
    );

    assert_eq!(
        call(&mut client, r#"{"jsonrpc":"2.0","id":4,"method":"unknown_method"}"#),
        json!({"id": 4, "jsonrpc": "2.0", "error": {"code": -32601, "message": "Method not found."}})
    );

    assert_eq!(
        call(&mut client, "{not json"),
        json!({"id": null, "jsonrpc": "2.0", "error": {"code": -32700, "message": "Parse error."}})
    );

    let echoed = call(
        &mut client,
        r#"{"jsonrpc":"2.0","id":"e","method":"echo","params":{"big":"xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx"}}"#,
    );
    assert_eq!(echoed["result"]["big"].as_str().unwrap().len(), 96);

    stop.store(true, Ordering::Relaxed);
    let server = handle.join().unwrap();
    assert_eq!(server.client_count(), 1);
}

#[test]
fn tcp_batch_and_describe() {
    let (stop, handle, mut client) = start_tcp(Framing::Netstring);

    let batch = call(
        &mut client,
        r#"[{"jsonrpc":"2.0","id":1,"method":"print"},{"jsonrpc":"2.0","method":"notify"},{"jsonrpc":"2.0","id":2,"method":"echo","params":[1,2]}]"#,
    );
    assert_eq!(
        batch,
        json!([
            {"jsonrpc": "2.0", "id": 1, "result": "success"},
            {"jsonrpc": "2.0", "id": 2, "result": [1, 2]}
        ])
    );

    let described = call(&mut client, r#"{"jsonrpc":"2.0","id":9,"method":"system.describe"}"#);
    assert_eq!(described["id"], 9);
    let methods = described["result"].as_object().unwrap();
    assert_eq!(methods.len(), 3);
    assert_eq!(methods["print"], "Print");
    assert_eq!(methods["notify"]["description"], "Notify");

    stop.store(true, Ordering::Relaxed);
    handle.join().unwrap();
}

#[test]
fn tcp_large_message_is_reassembled() {
    let (stop, handle, mut client) = start_tcp(Framing::Netstring);

    let payload = "y".repeat(100_000);
    let request = json!({"jsonrpc": "2.0", "id": 1, "method": "echo", "params": payload}).to_string();
    let reply = call(&mut client, &request);
    assert_eq!(reply["result"].as_str().unwrap().len(), 100_000);

    stop.store(true, Ordering::Relaxed);
    handle.join().unwrap();
}

#[test]
fn tcp_raw_json_session() {
    let (stop, handle, mut client) = start_tcp(Framing::None);

    client
        .send(r#"{"jsonrpc":"2.0","method":"notify"}"#)
        .unwrap();
    let reply = call(&mut client, r#"{"jsonrpc":"2.0","id":"raw","method":"print"}"#);
    assert_eq!(reply["id"], "raw");

    stop.store(true, Ordering::Relaxed);
    handle.join().unwrap();
}

#[test]
fn tcp_client_disconnect_is_purged() {
    let (stop, handle, client) = start_tcp(Framing::Netstring);
    drop(client);
    thread::sleep(Duration::from_millis(100));

    stop.store(true, Ordering::Relaxed);
    let server = handle.join().unwrap();
    assert_eq!(server.client_count(), 0);
}

#[test]
fn udp_round_trip() {
    let mut server = UdpServer::bind("127.0.0.1:0".parse().unwrap(), handler(), Framing::None).unwrap();
    server
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    let addr = server.local_addr().unwrap();

    let handle = thread::spawn(move || {
        server.recv().unwrap();
    });

    let mut client = UdpClient::connect(addr, Framing::None).unwrap();
    client
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    let reply: Value =
        serde_json::from_str(&client.call(r#"{"jsonrpc":"2.0","id":1,"method":"print"}"#).unwrap())
            .unwrap();
    handle.join().unwrap();

    assert_eq!(reply, json!({"jsonrpc": "2.0", "id": 1, "result": "success"}));
}
