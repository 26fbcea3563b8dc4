use std::sync::atomic::AtomicBool;

use earlink_frame::{
    DecodeProfile, FrameDecoder, FrameError, FrameReassembler, ProtocolVersion, Sample,
    SerialFrameReader, SerialReaderConfig,
};
use earlink_session::SessionConfig;
use earlink_transport::SerialStream;
use tracing::{debug, info};

use crate::cmd::{DecodeArgs, TransportKind};
use crate::exit::{frame_error, io_error, transport_error, CliResult, SUCCESS};
use crate::output::{OutputFormat, SamplePrinter};

pub fn run(args: DecodeArgs, format: OutputFormat, config: &SessionConfig) -> CliResult<i32> {
    let samples = match args.transport {
        TransportKind::Wireless => decode_wireless(&args, config)?,
        TransportKind::Serial => decode_serial(&args, config)?,
    };
    info!(samples = samples.len(), file = %args.file.display(), "capture decoded");

    let mut printer = SamplePrinter::new(&config.layout, format);
    for sample in &samples {
        printer.print(sample, None);
    }
    printer.finish();
    Ok(SUCCESS)
}

/// Replay a wireless capture as fixed-size notifications.
fn decode_wireless(args: &DecodeArgs, config: &SessionConfig) -> CliResult<Vec<Sample>> {
    let capture = std::fs::read(&args.file).map_err(|err| io_error("read capture", err))?;
    let version = ProtocolVersion::from_reported(args.protocol_version);
    let decoder = FrameDecoder::new(config.layout.clone(), DecodeProfile::wireless(version))
        .map_err(|err| frame_error("layout", err))?;
    let mut reassembler = FrameReassembler::new(version);

    let limit = args.count.unwrap_or(usize::MAX);
    let mut samples = Vec::new();
    'chunks: for chunk in capture.chunks(usize::from(args.chunk_size)) {
        reassembler.ingest(chunk);
        for frame in reassembler.extract_frames() {
            samples.push(decoder.decode(&frame));
            if samples.len() >= limit {
                break 'chunks;
            }
        }
    }

    let stats = reassembler.stats();
    debug!(
        ?version,
        frames = stats.frames,
        skipped_bytes = stats.skipped_bytes,
        rejected_frames = stats.rejected_frames,
        pending = reassembler.pending_len(),
        "wireless replay finished"
    );
    Ok(samples)
}

/// Replay a serial capture through the blocking reader.
fn decode_serial(args: &DecodeArgs, config: &SessionConfig) -> CliResult<Vec<Sample>> {
    let stream =
        SerialStream::open_capture(&args.file).map_err(|err| transport_error("open capture", err))?;
    let decoder = FrameDecoder::new(config.layout.clone(), DecodeProfile::serial())
        .map_err(|err| frame_error("layout", err))?;
    let replay = SerialReaderConfig {
        close_on_eof: true,
        read_timeout: None,
    };
    let mut reader = SerialFrameReader::with_decoder(stream, decoder, replay);

    let alive = AtomicBool::new(true);
    let limit = args.count.unwrap_or(usize::MAX);
    let mut samples = Vec::new();
    while samples.len() < limit {
        match reader.read_frame(&alive) {
            Ok(Some(frame)) => samples.push(reader.decoder().decode(&frame)),
            Ok(None) | Err(FrameError::ConnectionClosed) => break,
            Err(err) => return Err(frame_error("read capture", err)),
        }
    }

    debug!(
        skipped_bytes = reader.skipped_bytes(),
        rejected_frames = reader.rejected_frames(),
        "serial replay finished"
    );
    Ok(samples)
}
