use std::net::SocketAddr;
use std::time::{Duration, Instant};

use anyhow::Result;
use bytes::BytesMut;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use websockets_monoio_codec::codec::{Decoder, Encoder};
use websockets_monoio_codec::utf8::Utf8Validator;
use websockets_monoio_codec::{
    ClientHandshaker, CloseCode, DecoderConfig, Frame, FrameCodec, Opcode, Role, ServerHandshaker, WebSocketConfig,
    WebSocketVersion, WsClient, WsServer,
};

const LISTEN_ADDR: &str = "127.0.0.1:0";

async fn start_echo_server() -> Result<SocketAddr> {
    let server = WsServer::bind(LISTEN_ADDR, ServerHandshaker::new(), bench_config())?;
    let addr = server.local_addr()?;

    monoio::spawn(async move {
        loop {
            let (pending, _) = match server.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    eprintln!("benchmark echo accept error: {err:#}");
                    break;
                }
            };
            monoio::spawn(async move {
                let mut ws = match pending.handshake().await {
                    Ok(ws) => ws,
                    Err(err) => {
                        eprintln!("benchmark echo handshake error: {err:#}");
                        return;
                    }
                };
                while let Ok(Some(frame)) = ws.recv().await {
                    if matches!(frame.opcode, Opcode::Text | Opcode::Binary) {
                        if let Err(err) = ws.send(frame).await {
                            eprintln!("benchmark echo write error: {err:#}");
                            break;
                        }
                    }
                }
            });
        }
    });

    Ok(addr)
}

fn bench_config() -> WebSocketConfig {
    WebSocketConfig::default().max_frame_payload_len(1 << 20)
}

fn bench_connect(c: &mut Criterion) {
    let mut group = c.benchmark_group("connect");
    group.bench_function("ws_connect", |b| {
        let mut runtime = monoio::RuntimeBuilder::<monoio::FusionDriver>::new()
            .enable_all()
            .build()
            .expect("failed to build monoio runtime");
        let addr = runtime
            .block_on(start_echo_server())
            .expect("failed to start echo server");
        let url = format!("ws://{addr}/bench");

        b.iter_custom(|iters| {
            runtime.block_on(async {
                let mut total = Duration::ZERO;
                for _ in 0..iters {
                    let start = Instant::now();
                    let mut client = WsClient::connect(&url, &[])
                        .await
                        .expect("websocket connect");
                    total += start.elapsed();

                    let _ = client.ws.close(CloseCode::NORMAL, "").await;
                }
                total
            })
        });
    });
    group.finish();
}

fn bench_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("round_trip");
    let mut runtime = monoio::RuntimeBuilder::<monoio::FusionDriver>::new()
        .enable_all()
        .build()
        .expect("failed to build monoio runtime");
    let addr = runtime
        .block_on(start_echo_server())
        .expect("failed to start echo server");
    let url = format!("ws://{addr}/bench");

    let mut ws = runtime.block_on(async {
        WsClient::connect_with(
            ClientHandshaker::new(&url).expect("bench url"),
            bench_config(),
        )
        .await
        .expect("websocket connect")
        .into_inner()
    });

    for (label, size, text) in [
        ("text_32b", 32, true),
        ("binary_1kb", 1024, false),
        ("binary_64kb", 64 * 1024, false),
    ] {
        let payload = vec![b'x'; size];
        group.bench_function(label, |b| {
            b.iter_custom(|iters| {
                runtime.block_on(async {
                    let mut total = Duration::ZERO;
                    for _ in 0..iters {
                        let frame = if text {
                            Frame::text(payload.clone())
                        } else {
                            Frame::binary(payload.clone())
                        };
                        let start = Instant::now();
                        ws.send(frame).await.expect("write frame");
                        let echoed = ws.recv().await.expect("read frame").expect("open");
                        assert_eq!(echoed.payload.len(), size);
                        total += start.elapsed();
                    }
                    total
                })
            });
        });
    }

    runtime.block_on(async {
        let _ = ws.close(CloseCode::NORMAL, "").await;
    });
    group.finish();
}

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");
    let config = DecoderConfig::default().max_frame_payload_len(1 << 20);

    for size in [125usize, 4096, 64 * 1024] {
        group.throughput(Throughput::Bytes(size as u64));

        let mut client = FrameCodec::new(WebSocketVersion::V13, Role::Client, config);
        group.bench_with_input(BenchmarkId::new("encode_masked", size), &size, |b, &size| {
            let payload = vec![0x42u8; size];
            let mut dst = BytesMut::with_capacity(size + 14);
            b.iter(|| {
                dst.clear();
                client
                    .encode(Frame::binary(payload.clone()), &mut dst)
                    .expect("encode");
            });
        });

        let mut wire = BytesMut::new();
        client
            .encode(Frame::binary(vec![0x42u8; size]), &mut wire)
            .expect("encode");
        let wire = wire.freeze();
        group.bench_with_input(BenchmarkId::new("decode_masked", size), &size, |b, _| {
            let mut server = FrameCodec::new(WebSocketVersion::V13, Role::Server, config);
            b.iter(|| {
                let mut src = BytesMut::from(&wire[..]);
                server.decode(&mut src).expect("decode").expect("frame")
            });
        });

        let text = "héllo wörld ".repeat(size / 12 + 1);
        group.bench_with_input(BenchmarkId::new("utf8_validate", size), &size, |b, _| {
            b.iter(|| {
                let mut validator = Utf8Validator::new();
                validator.check(text.as_bytes()).expect("valid");
                validator.finish().expect("complete");
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_codec, bench_connect, bench_round_trip);
criterion_main!(benches);
