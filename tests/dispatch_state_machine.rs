//! Request-cycle tests driven through an in-memory transport.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use endpoint_dispatch::dispatch::{handler_fn, Exclusive, Handler, HandlerError};
use endpoint_dispatch::http::response::{METHOD_NOT_ALLOWED_BODY, NOT_FOUND_BODY};
use endpoint_dispatch::http::{Credentials, Request, Response};
use endpoint_dispatch::net::{Payload, PhaseKind, Termination};
use endpoint_dispatch::Dispatcher;

mod common;
use common::{body_text, exchange, send, ScriptedConnection};

/// Echoes what it saw and counts its calls.
#[derive(Clone, Default)]
struct Recorder {
    calls: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<Request>>>,
}

impl Handler for Recorder {
    fn handle(&self, request: &Request) -> Result<Response, HandlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(request.clone());
        Ok(Response::text(200, request.body_str()))
    }
}

impl Recorder {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last(&self) -> Request {
        self.seen.lock().unwrap().last().cloned().expect("handler never ran")
    }
}

#[test]
fn test_get_dispatches_once_with_empty_body() {
    let recorder = Recorder::default();
    let dispatcher = Dispatcher::builder()
        .register("/ping", recorder.clone(), false)
        .unwrap()
        .build();

    let response = exchange(&dispatcher, &ScriptedConnection::new(), "GET", "/ping", &[]);
    assert_eq!(response.status, 200);
    assert_eq!(recorder.calls(), 1);
    assert!(recorder.last().body().is_empty());
}

#[test]
fn test_chunked_body_seen_whole_after_last_chunk() {
    let recorder = Recorder::default();
    let dispatcher = Dispatcher::builder()
        .register("/submit", recorder.clone(), false)
        .unwrap()
        .build();
    let conn = ScriptedConnection::new().header("Content-Type", "text/plain");

    let mut ctx = dispatcher.begin("/submit");
    let (outcome, _) = send(&dispatcher, &mut ctx, &conn, "POST", "/submit", &[]);
    assert!(outcome.is_continue());

    for chunk in [&b"foo="[..], &b"bar"[..]] {
        let (outcome, remaining) = send(&dispatcher, &mut ctx, &conn, "POST", "/submit", chunk);
        assert!(outcome.is_continue());
        assert_eq!(remaining, 0);
        assert_eq!(recorder.calls(), 0);
    }
    assert_eq!(ctx.phase(), PhaseKind::BodyStreaming);

    let (outcome, _) = send(&dispatcher, &mut ctx, &conn, "POST", "/submit", &[]);
    let response = outcome.into_response().unwrap();
    assert_eq!(body_text(&response), "foo=bar");
    assert_eq!(recorder.calls(), 1);
    assert_eq!(ctx.phase(), PhaseKind::Answered);
    // Not form-encoded: no arguments parsed out of the body.
    assert!(recorder.last().args().is_empty());

    dispatcher.terminate(ctx, Termination::Completed);
}

#[test]
fn test_request_metadata_bound() {
    let recorder = Recorder::default();
    let dispatcher = Dispatcher::builder()
        .register("/users/{id}", recorder.clone(), false)
        .unwrap()
        .build();

    let mut conn = ScriptedConnection::new()
        .header("X-Trace", "abc")
        .cookie("session", "s1")
        .query("q", "hello%20world")
        .query("id", "shadowed");
    conn.credentials = Some(Credentials {
        user: "ann".to_string(),
        password: "pw".to_string(),
    });

    exchange(&dispatcher, &conn, "DELETE", "/users/%34%32", &[]);
    let request = recorder.last();

    assert_eq!(request.path(), "/users/42");
    assert_eq!(request.version(), "HTTP/1.1");
    assert_eq!(request.header("x-trace"), Some("abc"));
    assert_eq!(request.cookie("session"), Some("s1"));
    assert_eq!(request.arg("q"), Some("hello world"));
    assert_eq!(request.arg("id"), Some("42"));
    assert_eq!(request.credentials().map(|c| c.user.as_str()), Some("ann"));
    assert_eq!(request.requestor_port(), Some(51000));
}

#[test]
fn test_form_fields_merge_with_path_params() {
    let recorder = Recorder::default();
    let dispatcher = Dispatcher::builder()
        .register("/orders/{order}/items", recorder.clone(), false)
        .unwrap()
        .build();
    let conn = ScriptedConnection::new()
        .header("Content-Type", "application/x-www-form-urlencoded; charset=utf-8")
        .query("page", "2");

    exchange(
        &dispatcher,
        &conn,
        "PUT",
        "/orders/7/items",
        &[b"sku=ab", b"c%2", b"0d&order=overridden&qty=3"],
    );
    let request = recorder.last();

    assert_eq!(request.arg("sku"), Some("abc d"));
    assert_eq!(request.arg("qty"), Some("3"));
    assert_eq!(request.arg("page"), Some("2"));
    assert_eq!(request.arg("order"), Some("7"));
    assert_eq!(request.body_str(), "sku=abc%20d&order=overridden&qty=3");
}

#[test]
fn test_long_form_value_does_not_drop_fields() {
    let recorder = Recorder::default();
    let dispatcher = Dispatcher::builder()
        .register("/f", recorder.clone(), false)
        .unwrap()
        .build();
    let conn = ScriptedConnection::new().header("Content-Type", "application/x-www-form-urlencoded");

    let mut first = b"name=".to_vec();
    first.extend(std::iter::repeat(b'x').take(2000));
    exchange(&dispatcher, &conn, "POST", "/f", &[&first, b"&after=1"]);
    let request = recorder.last();

    assert_eq!(request.arg("name").map(str::len), Some(2000));
    assert_eq!(request.arg("after"), Some("1"));
}

#[test]
fn test_miss_and_unknown_method_never_call_handlers() {
    let recorder = Recorder::default();
    let dispatcher = Dispatcher::builder()
        .register("/users/{id}", recorder.clone(), false)
        .unwrap()
        .build();
    let conn = ScriptedConnection::new();

    let missed = exchange(&dispatcher, &conn, "GET", "/users/42/extra", &[]);
    assert_eq!(missed.status, 404);
    assert_eq!(body_text(&missed), NOT_FOUND_BODY);
    assert!(missed
        .headers
        .iter()
        .any(|(k, v)| k == "Content-Type" && v == "application/json"));

    let rejected = exchange(&dispatcher, &conn, "PROPFIND", "/users/42", &[]);
    assert_eq!(rejected.status, 405);
    assert_eq!(body_text(&rejected), METHOD_NOT_ALLOWED_BODY);

    assert_eq!(recorder.calls(), 0);
}

#[test]
fn test_family_endpoint_takes_deeper_paths() {
    let exact = Recorder::default();
    let family = Recorder::default();
    let dispatcher = Dispatcher::builder()
        .register("/users/{id}", exact.clone(), false)
        .unwrap()
        .register("/users/{id}/*", family.clone(), true)
        .unwrap()
        .build();
    let conn = ScriptedConnection::new();

    exchange(&dispatcher, &conn, "GET", "/users/42/extra/more", &[]);
    assert_eq!(family.calls(), 1);
    assert_eq!(family.last().arg("id"), Some("42"));

    exchange(&dispatcher, &conn, "GET", "/users/42", &[]);
    assert_eq!(exact.calls(), 1);
}

#[test]
fn test_handler_fault_propagates_without_response() {
    let dispatcher = Dispatcher::builder()
        .register("/fail", handler_fn(|_| Err("backend down".into())), false)
        .unwrap()
        .build();
    let conn = ScriptedConnection::new();

    let mut ctx = dispatcher.begin("/fail");
    let mut remaining = 0;
    let result = dispatcher.handle(
        &mut ctx,
        &conn,
        endpoint_dispatch::net::RequestEvent {
            method: "GET",
            url: "/fail",
            version: "HTTP/1.1",
            upload: &[],
            remaining: &mut remaining,
        },
    );
    let err = result.unwrap_err();
    assert!(err.to_string().contains("backend down"));
    dispatcher.terminate(ctx, Termination::WithError);
}

#[test]
fn test_abort_mid_stream_releases_context() {
    let recorder = Recorder::default();
    let dispatcher = Dispatcher::builder()
        .register("/upload", recorder.clone(), false)
        .unwrap()
        .build();
    let conn = ScriptedConnection::new();

    let mut ctx = dispatcher.begin("/upload");
    send(&dispatcher, &mut ctx, &conn, "POST", "/upload", &[]);
    send(&dispatcher, &mut ctx, &conn, "POST", "/upload", b"partial");
    assert_eq!(ctx.body_len(), 7);

    dispatcher.terminate(ctx, Termination::ClientAbort);
    assert_eq!(recorder.calls(), 0);
}

#[test]
fn test_trailers_read_at_completion() {
    let recorder = Recorder::default();
    let dispatcher = Dispatcher::builder()
        .register("/t", recorder.clone(), false)
        .unwrap()
        .build();
    let mut conn = ScriptedConnection::new();

    let mut ctx = dispatcher.begin("/t");
    send(&dispatcher, &mut ctx, &conn, "POST", "/t", &[]);
    send(&dispatcher, &mut ctx, &conn, "POST", "/t", b"data");
    conn.trailers.push(("X-Checksum".to_string(), "abc".to_string()));
    send(&dispatcher, &mut ctx, &conn, "POST", "/t", &[]);

    assert_eq!(recorder.last().trailer("x-checksum"), Some("abc"));
}

#[test]
fn test_response_headers_and_file_region_pass_through() {
    use std::io::Write;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"hello, world").unwrap();
    let path = file.path().to_path_buf();

    let dispatcher = Dispatcher::builder()
        .register(
            "/file",
            handler_fn(move |_| {
                let file = std::fs::File::open(&path)?;
                Ok(Response::file_region(206, file, 7, None)
                    .with_header("Set-Cookie", "a=1")
                    .with_header("Set-Cookie", "b=2")
                    .with_trailer("X-Done", "yes"))
            }),
            false,
        )
        .unwrap()
        .build();

    let response = exchange(&dispatcher, &ScriptedConnection::new(), "GET", "/file", &[]);
    assert_eq!(response.status, 206);
    assert_eq!(
        response.headers,
        vec![
            ("Set-Cookie".to_string(), "a=1".to_string()),
            ("Set-Cookie".to_string(), "b=2".to_string()),
        ]
    );
    assert_eq!(response.trailers.len(), 1);
    match response.payload {
        Payload::File { offset, len, .. } => assert_eq!((offset, len), (7, 5)),
        Payload::Buffer(_) => panic!("expected file payload"),
    }
}

#[test]
fn test_exclusive_handlers_never_overlap() {
    let inside = Arc::new(AtomicUsize::new(0));
    let overlap = Arc::new(AtomicUsize::new(0));
    let (i, o) = (inside.clone(), overlap.clone());

    let dispatcher = Arc::new(
        Dispatcher::builder()
            .register(
                "/locked",
                Exclusive(handler_fn(move |_| {
                    if i.fetch_add(1, Ordering::SeqCst) > 0 {
                        o.fetch_add(1, Ordering::SeqCst);
                    }
                    std::thread::sleep(Duration::from_millis(5));
                    i.fetch_sub(1, Ordering::SeqCst);
                    Ok(Response::new(204))
                })),
                false,
            )
            .unwrap()
            .build(),
    );

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let dispatcher = Arc::clone(&dispatcher);
            std::thread::spawn(move || {
                for _ in 0..5 {
                    let response = exchange(&dispatcher, &ScriptedConnection::new(), "GET", "/locked", &[]);
                    assert_eq!(response.status, 204);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(overlap.load(Ordering::SeqCst), 0);
}
