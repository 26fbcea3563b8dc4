//! Dual-channel example: drives a simulated left/right earbud pair through a session.
//!
//! Run with:
//!   cargo run --example dual-channel --features session

use std::sync::mpsc;

use earlink::frame::{encode_frame, FrameFields, Sample};
use earlink::session::{
    ChannelCoordinator, NotificationHandler, SessionConfig, SessionError, Side, WirelessChannel,
    WirelessLink,
};

/// Stands in for a real wireless link: remembers the subscriber and echoes a status
/// line for every `w` command, the way the firmware does.
#[derive(Default)]
struct SimulatedLink {
    handler: Option<NotificationHandler>,
}

impl WirelessLink for SimulatedLink {
    fn open(&mut self) -> Result<(), SessionError> {
        Ok(())
    }

    fn subscribe(&mut self, handler: NotificationHandler) -> Result<(), SessionError> {
        self.handler = Some(handler);
        Ok(())
    }

    fn write_command(&mut self, command: &[u8]) -> Result<(), SessionError> {
        eprintln!("[link] command {:?}", String::from_utf8_lossy(command));
        if command.first() == Some(&b'w') {
            if let Some(handler) = &self.handler {
                handler.on_notification(b"@AAVAA-4 gain updated");
            }
        }
        Ok(())
    }

    fn unsubscribe(&mut self) -> Result<(), SessionError> {
        self.handler = None;
        Ok(())
    }

    fn close(&mut self) -> Result<(), SessionError> {
        Ok(())
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = SessionConfig::default();
    let (tx, rx) = mpsc::channel::<(Side, Sample)>();

    let left_tx = tx.clone();
    let left = WirelessChannel::new(
        Side::Left,
        SimulatedLink::default(),
        move |sample: Sample| {
            let _ = left_tx.send((Side::Left, sample));
        },
        &config,
    )?;
    let right = WirelessChannel::new(
        Side::Right,
        SimulatedLink::default(),
        move |sample: Sample| {
            let _ = tx.send((Side::Right, sample));
        },
        &config,
    )?;
    let handlers = [left.handler(), right.handler()];

    let mut session = ChannelCoordinator::new(left, right, config);
    session.prepare()?;

    // The status reply also carries the protocol version used once streaming starts.
    let status = session.config_board("w0110")?;
    eprintln!("[session] status response: {status:?}");

    session.start()?;
    for package_number in 0..4u8 {
        let wire = encode_frame(&FrameFields {
            package_number,
            amplitudes: [1.0, -1.0, 0.5, 0.0, 0.0, 0.0, 0.0, 0.0],
            orientation: [1200, -300, 9000],
            battery: 87,
            device_timestamp: 1000 + u32::from(package_number) * 4,
            ..FrameFields::default()
        });
        for handler in &handlers {
            // Deliver each frame split across two notifications.
            handler.on_notification(&wire[..30]);
            handler.on_notification(&wire[30..]);
        }
    }
    session.stop()?;
    session.release()?;

    for (side, sample) in rx.try_iter() {
        eprintln!(
            "[{side}] pkg={} eeg0={:.4}uV yaw={:.2} bat={}",
            sample.get(0),
            sample.get(1),
            sample.get(9),
            sample.get(12)
        );
    }
    Ok(())
}
