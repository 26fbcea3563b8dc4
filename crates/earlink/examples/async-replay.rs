//! Async replay example: decodes a raw serial capture with `FramedRead`.
//!
//! Run with:
//!   cargo run --example async-replay --features async -- capture.bin

use std::path::PathBuf;

use earlink::frame::{ChannelLayout, DecodeProfile, FrameCodec, FrameDecoder};
use futures_util::StreamExt;
use tokio_util::codec::FramedRead;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .ok_or("usage: async-replay <CAPTURE>")?;
    let capture = std::fs::read(&path)?;

    let decoder = FrameDecoder::new(ChannelLayout::default(), DecodeProfile::serial())?;
    let mut frames = FramedRead::new(capture.as_slice(), FrameCodec::new());

    let mut count = 0usize;
    while let Some(frame) = frames.next().await {
        let sample = decoder.decode(&frame?);
        println!("{}", csv_line(sample.values()));
        count += 1;
    }

    let stats = frames.decoder().stats();
    eprintln!(
        "decoded {count} samples, skipped {} bytes, rejected {} frames",
        stats.skipped_bytes, stats.rejected_frames
    );
    Ok(())
}

fn csv_line(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",")
}
