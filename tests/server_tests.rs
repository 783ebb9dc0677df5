mod common;

use std::net::TcpStream;
use std::thread;
use std::time::Duration;

use asr_relay::protocol::{pcm16_bytes, read_response, Request};
use asr_relay::{DecoderError, Server, ServerConfig};
use common::{tone, FakeDecoder};

fn local_config(workers: usize) -> ServerConfig {
    ServerConfig {
        bind_address: "127.0.0.1".to_string(),
        workers,
        ..ServerConfig::default()
    }
}

#[test]
fn test_client_round_trip_over_tcp() {
    let server = Server::bind(&local_config(1), 0).unwrap();
    let addr = server.local_addr().unwrap();

    thread::spawn(move || {
        let _ = server.serve(|| Ok(FakeDecoder::with_grammars(&["g1.lm", "g2.lm"])));
    });

    // Each connection gets a fresh decoder, so the second client starts
    // from the initial grammar again
    for _ in 0..2 {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();

        std::io::Write::write_all(&mut stream, &Request::Finish.encode().unwrap()).unwrap();
        assert!(read_response(&mut stream).unwrap().is_empty());

        let mut frames = Request::Data(pcm16_bytes(&tone(160))).encode().unwrap();
        frames.extend(Request::Finish.encode().unwrap());
        std::io::Write::write_all(&mut stream, &frames).unwrap();

        assert!(read_response(&mut stream).unwrap().is_empty());
        let reply = read_response(&mut stream).unwrap();
        let hyp = reply.hypothesis.expect("final hypothesis");
        assert_eq!(hyp.text, "lm:g1.lm heard 160 samples");
        assert!((0..=1000).contains(&hyp.confidence));

        std::io::Write::write_all(&mut stream, &Request::Grammar("g2.lm".into()).encode().unwrap())
            .unwrap();
        assert!(read_response(&mut stream).unwrap().is_empty());
    }
}

#[test]
fn test_decoder_failure_aborts_startup() {
    let server = Server::bind(&local_config(2), 0).unwrap();
    let result = server.serve(|| -> Result<FakeDecoder, DecoderError> {
        Err(DecoderError::EmptyWorkingSet)
    });
    assert!(result.is_err());
}
