use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

use earlink_frame::{Sample, SampleSink};
use earlink_session::{Channel, ChannelCoordinator, SerialBoard, SessionConfig, Side};
use tracing::info;

use crate::cmd::StreamArgs;
use crate::exit::{session_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{OutputFormat, SamplePrinter};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

type Tagged = (Side, Sample);

pub fn run(args: StreamArgs, format: OutputFormat, config: SessionConfig) -> CliResult<i32> {
    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(Arc::clone(&running))?;

    let layout = config.layout.clone();
    let mut printer = SamplePrinter::new(&layout, format);
    let (tx, rx) = mpsc::channel::<Tagged>();

    let left_sink = forward(Side::Left, tx.clone());
    let left = SerialBoard::open_path(Side::Left, &args.device, left_sink, &config)
        .map_err(|err| session_error("left board", err))?;

    let printed = match &args.right {
        None => {
            drop(tx);
            stream_single(left, &args, &rx, &running, &mut printer)?
        }
        Some(right_path) => {
            let right_sink = forward(Side::Right, tx);
            let right = SerialBoard::open_path(Side::Right, right_path, right_sink, &config)
                .map_err(|err| session_error("right board", err))?;
            let session = ChannelCoordinator::new(left, right, config);
            stream_pair(session, &args, &rx, &running, &mut printer)?
        }
    };

    printer.finish();
    info!(printed, "stream finished");
    Ok(SUCCESS)
}

fn stream_single(
    mut board: SerialBoard,
    args: &StreamArgs,
    rx: &Receiver<Tagged>,
    running: &AtomicBool,
    printer: &mut SamplePrinter<'_>,
) -> CliResult<usize> {
    board.prepare().map_err(|err| session_error("prepare", err))?;
    if let Some(command) = &args.config_command {
        board
            .config_board(command)
            .map_err(|err| session_error("config", err))?;
    }
    board.start().map_err(|err| session_error("start", err))?;

    let printed = pump(rx, running, args.count, printer, false);

    let stopped = board.stop();
    let released = board.release();
    stopped.map_err(|err| session_error("stop", err))?;
    released.map_err(|err| session_error("release", err))?;
    Ok(printed)
}

fn stream_pair(
    mut session: ChannelCoordinator,
    args: &StreamArgs,
    rx: &Receiver<Tagged>,
    running: &AtomicBool,
    printer: &mut SamplePrinter<'_>,
) -> CliResult<usize> {
    session
        .prepare()
        .map_err(|err| session_error("prepare", err))?;
    if let Some(command) = &args.config_command {
        let response = session
            .config_board(command)
            .map_err(|err| session_error("config", err))?;
        if let Some(status) = response {
            info!(%status, "device status");
        }
    }
    session.start().map_err(|err| session_error("start", err))?;

    let printed = pump(rx, running, args.count, printer, true);

    let stopped = session.stop();
    let released = session.release();
    stopped.map_err(|err| session_error("stop", err))?;
    released.map_err(|err| session_error("release", err))?;
    Ok(printed)
}

/// Print samples until Ctrl-C, `count` samples, or every sink has gone away.
fn pump(
    rx: &Receiver<Tagged>,
    running: &AtomicBool,
    count: Option<usize>,
    printer: &mut SamplePrinter<'_>,
    tag_sides: bool,
) -> usize {
    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok((side, sample)) => {
                printer.print(&sample, tag_sides.then_some(side.as_str()));
                printed = printed.saturating_add(1);
                if count.is_some_and(|count| printed >= count) {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    printed
}

fn forward(side: Side, tx: Sender<Tagged>) -> impl SampleSink + 'static {
    move |sample: Sample| {
        let _ = tx.send((side, sample));
    }
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
