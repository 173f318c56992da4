//! In-process loopback demo
//!
//! Run with: cargo run --example loopback [FRAMES]
//!
//! Starts an orchestrator over the in-memory transport, then:
//!
//! - a producer sends synthetic video frames
//! - an observer receives the transformed feed
//! - the observer's control channel switches transforms mid-stream and
//!   prints the detection events it receives
//!
//! Set `RUST_LOG=peerlens=trace` to see every frame move through the relays.

use std::time::Duration;

use bytes::Bytes;
use peerlens::error::TransformFault;
use peerlens::media::{Frame, FrameSource, MediaKind};
use peerlens::transform::TransformOutput;
use peerlens::transport::MemoryTransportFactory;
use peerlens::{OfferRequest, OrchestratorConfig, SessionOrchestrator, TransformCatalog};

const OFFER: &str = "v=0\r\nm=audio 9 UDP/TLS/RTP/SAVPF 111\r\nm=video 9 UDP/TLS/RTP/SAVPF 96\r\n";

/// Inverts every byte of the frame
fn invert(frame: &Frame) -> Result<TransformOutput, TransformFault> {
    let data: Vec<u8> = frame.data.iter().map(|b| !b).collect();
    let out = Frame::video(frame.pts, frame.width, frame.height, Bytes::from(data));
    Ok(TransformOutput::new(out))
}

/// Reports frames whose mean brightness is above half scale
fn bright_spots(frame: &Frame) -> Result<TransformOutput, TransformFault> {
    if frame.data.is_empty() {
        return Err(TransformFault::new("bright", "empty frame"));
    }
    let mean = frame.data.iter().map(|&b| b as u64).sum::<u64>() / frame.data.len() as u64;
    let events = if mean > 127 {
        vec![format!("bright frame at {}ms (mean {})", frame.time_base.to_millis(frame.pts), mean)]
    } else {
        Vec::new()
    };
    Ok(TransformOutput::with_events(frame.clone(), events))
}

fn synthetic_frame(n: i64) -> Frame {
    let level = ((n * 37) % 256) as u8;
    Frame::video(n * 3000, 4, 4, Bytes::from(vec![level; 16]))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let frames: i64 = match std::env::args().nth(1) {
        Some(arg) => arg.parse()?,
        None => 30,
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("peerlens=info".parse()?)
                .add_directive("loopback=debug".parse()?),
        )
        .init();

    let catalog = TransformCatalog::new()
        .with("invert", "Invert", invert)
        .with("bright", "Bright spots", bright_spots);

    let (factory, mut peers) = MemoryTransportFactory::new();
    let orchestrator = SessionOrchestrator::new(OrchestratorConfig::default(), catalog, factory);

    println!("Transforms:");
    for info in orchestrator.list_transforms() {
        println!("  {:<12} {}", info.key, info.label);
    }
    println!();

    // Producer
    orchestrator
        .handle_offer(OfferRequest::producer(OFFER, Some("invert")))
        .await?;
    let producer = peers.recv().await.ok_or("producer peer missing")?;
    producer.connect().await;
    let camera = producer.send_track("camera", MediaKind::Video, 8).await;

    while orchestrator.sources().current().await.is_none() {
        tokio::task::yield_now().await;
    }

    // Observer of the transformed feed
    let answer = orchestrator
        .handle_offer(OfferRequest::observer(OFFER, false))
        .await?;
    tracing::debug!(sdp = %answer.sdp, "Observer answer");
    let mut observer = peers.recv().await.ok_or("observer peer missing")?;
    observer.connect().await;
    let mut feed = observer.next_track().await.ok_or("observer has no feed")?;
    let mut control = observer.open_channel("chat", 32).await;

    let viewer = tokio::spawn(async move {
        let mut received = 0u64;
        while let Some(frame) = feed.recv().await {
            received += 1;
            tracing::debug!(pts = frame.pts, first_byte = frame.data[0], "Observer frame");
        }
        received
    });

    for n in 0..frames {
        if n == frames / 2 {
            control.send("transform:bright").await;
            control.send("hello from the observer").await;
        }
        camera.send(synthetic_frame(n)).await?;
        tokio::time::sleep(Duration::from_millis(10)).await;

        while let Some(text) = control.try_recv() {
            println!("control <- {}", text);
        }
    }

    for stats in orchestrator.source_stats().await {
        println!(
            "source of session {}: raw {} frames, transformed {} frames, transform '{}', {} events",
            stats.producer,
            stats.raw.frames_published,
            stats.transformed.frames_published,
            stats.stage.transform,
            stats.stage.events_emitted,
        );
    }

    let report = orchestrator.shutdown().await;
    println!("Closed {} sessions ({} failed)", report.closed, report.failed.len());

    let received = viewer.await?;
    println!("Observer received {} of {} frames", received, frames);

    Ok(())
}
