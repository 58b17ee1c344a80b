//! Scripted fake daemon for tests

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::{ClientConfig, GqrxClient};

/// Start a daemon that expects each command of `script` in order and
/// answers with the paired reply, then waits for `q` and the socket to close.
///
/// The returned handle fails if the client deviated from the script.
pub(crate) async fn scripted_daemon(
    script: &[(&'static str, &'static str)],
) -> (GqrxClient, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let script = script.to_vec();

    let daemon = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        for (expected, reply) in script {
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            assert_eq!(line.trim_end(), expected);
            write_half.write_all(reply.as_bytes()).await.unwrap();
            write_half.write_all(b"\n").await.unwrap();
        }

        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        assert_eq!(line, "q\n");
    });

    let config = ClientConfig {
        port,
        ..ClientConfig::default()
    };
    let client = GqrxClient::connect(&config).await.unwrap();
    (client, daemon)
}
