//! End-to-end tests driving [`imap_transport::engine::Client`] against an
//! in-process plaintext TCP server, covering the scenarios in the
//! specification's testable-properties section.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::UnboundedReceiver;

use imap_transport::compiler::{Arg, Request};
use imap_transport::{Client, Config, Event, SimpleCompiler, SimpleParser};

/// Binds an ephemeral localhost listener, spawns `script` against the
/// first accepted connection, and connects a [`Client`] to it.
async fn connect_with_server<F, Fut>(script: F) -> (Client, UnboundedReceiver<Event>)
where
    F: FnOnce(TcpStream) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind ephemeral port");
    let port = listener.local_addr().expect("local addr").port();

    tokio::spawn(async move {
        let (stream, _addr) = listener.accept().await.expect("accept");
        script(stream).await;
    });

    let config = Config::builder("127.0.0.1")
        .port(port)
        .security(imap_transport::Security::None)
        .connect_timeout(Duration::from_secs(5))
        .build();

    Client::connect(config, Arc::new(SimpleParser), Arc::new(SimpleCompiler))
        .await
        .expect("connect")
}

/// Reads one line (up to and including `\n`) off `stream`.
async fn read_line(stream: &mut TcpStream) -> String {
    let mut line = Vec::new();
    let mut byte = [0_u8; 1];
    loop {
        let n = stream.read(&mut byte).await.expect("read");
        assert_ne!(n, 0, "stream closed mid-line");
        line.push(byte[0]);
        if byte[0] == b'\n' {
            break;
        }
    }
    String::from_utf8(line).expect("utf8 line")
}

#[tokio::test]
async fn greeting_then_idle() {
    let (_client, mut events) = connect_with_server(|mut stream| async move {
        stream.write_all(b"* OK IMAP4rev1 ready\r\n").await.expect("write greeting");
        // Keep the connection open long enough for the idle timer to fire.
        tokio::time::sleep(Duration::from_secs(2)).await;
    })
    .await;

    assert!(matches!(events.recv().await, Some(Event::Ready)));
    assert!(matches!(events.recv().await, Some(Event::Idle)));
}

#[tokio::test]
async fn simple_command_resolves_with_tagged_ok_and_no_payload() {
    let (client, mut events) = connect_with_server(|mut stream| async move {
        stream.write_all(b"* OK ready\r\n").await.expect("write greeting");
        let line = read_line(&mut stream).await;
        assert_eq!(line, "W1 CAPABILITY\r\n");
        stream
            .write_all(b"* CAPABILITY IMAP4rev1 AUTH=PLAIN\r\n")
            .await
            .expect("write capability");
        stream.write_all(b"W1 OK done\r\n").await.expect("write tagged ok");
    })
    .await;

    assert!(matches!(events.recv().await, Some(Event::Ready)));

    let outcome = client
        .enqueue(Request::bare("CAPABILITY"))
        .await
        .expect("completion channel")
        .expect("command succeeds");
    assert_eq!(outcome.tagged.human_readable.as_deref(), Some("done"));
    assert!(outcome.payload.is_empty());
}

#[tokio::test]
async fn untagged_responses_collect_into_payload() {
    let (client, mut events) = connect_with_server(|mut stream| async move {
        stream.write_all(b"* OK ready\r\n").await.expect("write greeting");
        let line = read_line(&mut stream).await;
        assert_eq!(line, "W1 LIST \"\" \"*\"\r\n");
        stream
            .write_all(b"* LIST (\\HasChildren) \"/\" INBOX\r\n")
            .await
            .expect("write list 1");
        stream
            .write_all(b"* LIST () \"/\" Sent\r\n")
            .await
            .expect("write list 2");
        stream.write_all(b"W1 OK listed\r\n").await.expect("write tagged ok");
    })
    .await;

    assert!(matches!(events.recv().await, Some(Event::Ready)));

    let request = Request::bare("LIST")
        .with_arg(Arg::Quoted(String::new()))
        .with_arg(Arg::Quoted("*".to_string()));
    let mut options = imap_transport::EnqueueOptions::default();
    options.accept_untagged.insert("LIST".to_string());

    let outcome = client
        .enqueue_with_options(request, options)
        .await
        .expect("completion channel")
        .expect("command succeeds");

    let list_payload = outcome.payload.get("LIST").expect("LIST bucket present");
    assert_eq!(list_payload.len(), 2);
}

#[tokio::test]
async fn global_handler_receives_numeric_untagged_response() {
    let (client, mut events) = connect_with_server(|mut stream| async move {
        stream.write_all(b"* OK ready\r\n").await.expect("write greeting");
        let line = read_line(&mut stream).await;
        assert_eq!(line, "W1 NOOP\r\n");
        stream.write_all(b"* 42 EXISTS\r\n").await.expect("write exists");
        stream.write_all(b"W1 OK done\r\n").await.expect("write tagged ok");
    })
    .await;

    assert!(matches!(events.recv().await, Some(Event::Ready)));

    let (tx, rx) = std::sync::mpsc::channel();
    client.set_handler("EXISTS", move |response| {
        let _ = tx.send((response.command.clone(), response.nr));
    });

    client
        .enqueue(Request::bare("NOOP"))
        .await
        .expect("completion channel")
        .expect("command succeeds");

    let (command, nr) = rx.try_recv().expect("handler fired");
    assert_eq!(command, "EXISTS");
    assert_eq!(nr, Some(42));
}

#[tokio::test]
async fn literal_split_across_chunks_yields_one_fetch_response() {
    let (client, mut events) = connect_with_server(|mut stream| async move {
        stream.write_all(b"* OK ready\r\n").await.expect("write greeting");
        let line = read_line(&mut stream).await;
        assert_eq!(line, "W1 NOOP\r\n");

        stream
            .write_all(b"* 1 FETCH (BODY[] {11}\r\nhello")
            .await
            .expect("write first chunk");
        tokio::time::sleep(Duration::from_millis(50)).await;
        stream
            .write_all(b" world)\r\nW1 OK fetched\r\n")
            .await
            .expect("write second chunk");
    })
    .await;

    assert!(matches!(events.recv().await, Some(Event::Ready)));

    let outcome = client
        .enqueue(Request::bare("NOOP"))
        .await
        .expect("completion channel")
        .expect("command succeeds");
    assert_eq!(outcome.tagged.human_readable.as_deref(), Some("fetched"));
}

#[tokio::test]
async fn append_drives_continuation_handshake() {
    let (client, mut events) = connect_with_server(|mut stream| async move {
        stream.write_all(b"* OK ready\r\n").await.expect("write greeting");

        let line = read_line(&mut stream).await;
        assert_eq!(line, "W1 APPEND INBOX {5}\r\n");
        stream
            .write_all(b"+ Ready for literal data\r\n")
            .await
            .expect("write continuation");

        let line = read_line(&mut stream).await;
        assert_eq!(line, "hello\r\n");
        stream.write_all(b"W1 OK appended\r\n").await.expect("write tagged ok");
    })
    .await;

    assert!(matches!(events.recv().await, Some(Event::Ready)));

    let request = Request::bare("APPEND")
        .with_arg(Arg::Atom("INBOX".to_string()))
        .with_arg(Arg::Literal(b"hello".to_vec()));
    let outcome = client
        .enqueue(request)
        .await
        .expect("completion channel")
        .expect("command succeeds");
    assert_eq!(outcome.tagged.human_readable.as_deref(), Some("appended"));
}

#[tokio::test]
async fn tagged_no_rejects_completion_with_protocol_error() {
    let (client, mut events) = connect_with_server(|mut stream| async move {
        stream.write_all(b"* OK ready\r\n").await.expect("write greeting");
        let line = read_line(&mut stream).await;
        assert_eq!(line, "W1 LOGIN foo bar\r\n");
        stream
            .write_all(b"W1 NO [AUTHENTICATIONFAILED] bad creds\r\n")
            .await
            .expect("write tagged no");
    })
    .await;

    assert!(matches!(events.recv().await, Some(Event::Ready)));

    let request = Request::bare("LOGIN")
        .with_arg(Arg::Atom("foo".to_string()))
        .with_arg(Arg::Atom("bar".to_string()));
    let outcome = client.enqueue(request).await.expect("completion channel");

    match outcome {
        Err(imap_transport::Error::Protocol { code, human_readable }) => {
            assert_eq!(code.as_deref(), Some("AUTHENTICATIONFAILED"));
            assert_eq!(human_readable, "bad creds");
        }
        other => panic!("expected Protocol error, got {other:?}"),
    }
}

#[tokio::test]
async fn close_is_idempotent_and_rejects_outstanding_commands() {
    let (client, mut events) = connect_with_server(|mut stream| async move {
        stream.write_all(b"* OK ready\r\n").await.expect("write greeting");
        let _line = read_line(&mut stream).await;
        // Never answer; the client will be closed out from under the command.
        tokio::time::sleep(Duration::from_secs(5)).await;
    })
    .await;

    assert!(matches!(events.recv().await, Some(Event::Ready)));

    let completion = client.enqueue(Request::bare("NOOP"));
    client.close();
    client.close();

    let outcome = completion.await.expect("completion channel resolves on close");
    assert!(matches!(outcome, Err(imap_transport::Error::ConnectionClosed)));
}
