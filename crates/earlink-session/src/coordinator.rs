use std::thread;

use tracing::{debug, info, warn};

use crate::channel::{Channel, Side, StatusReport};
use crate::config::SessionConfig;
use crate::error::{Result, SessionError};

/// Lifecycle position of a [`ChannelCoordinator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Prepared,
    Streaming,
    Released,
}

/// Drives a left and a right channel as one session.
///
/// Every operation runs left first and touches the right channel only if the left
/// one succeeded. The first error is returned as-is and nothing is rolled back;
/// [`release`](Self::release) stays callable to clean up whatever was acquired.
pub struct ChannelCoordinator {
    left: Box<dyn Channel>,
    right: Box<dyn Channel>,
    config: SessionConfig,
    initialized: bool,
    streaming: bool,
    /// A prepare failed after the left channel had been acquired.
    partially_prepared: bool,
    released: bool,
}

impl ChannelCoordinator {
    pub fn new(
        left: impl Channel + 'static,
        right: impl Channel + 'static,
        config: SessionConfig,
    ) -> Self {
        Self::from_boxed(Box::new(left), Box::new(right), config)
    }

    pub fn from_boxed(
        left: Box<dyn Channel>,
        right: Box<dyn Channel>,
        config: SessionConfig,
    ) -> Self {
        if left.side() != Side::Left || right.side() != Side::Right {
            warn!(
                left = %left.side(),
                right = %right.side(),
                "channels passed in unexpected positions"
            );
        }
        Self {
            left,
            right,
            config,
            initialized: false,
            streaming: false,
            partially_prepared: false,
            released: false,
        }
    }

    pub fn state(&self) -> SessionState {
        match (self.initialized, self.streaming) {
            (true, true) => SessionState::Streaming,
            (true, false) => SessionState::Prepared,
            (false, _) if self.released => SessionState::Released,
            (false, _) => SessionState::Uninitialized,
        }
    }

    pub fn is_prepared(&self) -> bool {
        self.initialized
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn left(&self) -> &dyn Channel {
        self.left.as_ref()
    }

    pub fn right(&self) -> &dyn Channel {
        self.right.as_ref()
    }

    /// Acquire both channels.
    pub fn prepare(&mut self) -> Result<()> {
        if self.initialized {
            info!("session already prepared");
            return Ok(());
        }

        self.left.prepare()?;
        if let Err(err) = self.right.prepare() {
            self.partially_prepared = true;
            return Err(err);
        }

        self.initialized = true;
        self.partially_prepared = false;
        self.released = false;
        info!("session prepared");
        Ok(())
    }

    /// Start streaming on both channels.
    pub fn start(&mut self) -> Result<()> {
        if !self.initialized {
            return Err(SessionError::BoardNotCreated);
        }
        if self.streaming {
            return Err(SessionError::StreamAlreadyRunning);
        }

        self.left.start()?;
        self.right.start()?;
        self.streaming = true;
        info!("session streaming");
        Ok(())
    }

    /// Stop streaming on both channels, whether or not the session is streaming.
    pub fn stop(&mut self) -> Result<()> {
        self.left.stop()?;
        self.right.stop()?;
        self.streaming = false;
        info!("session stopped");
        Ok(())
    }

    /// Release both channels.
    pub fn release(&mut self) -> Result<()> {
        if !self.initialized && !self.partially_prepared {
            debug!("release on unprepared session");
            return Ok(());
        }

        self.left.release()?;
        self.right.release()?;
        self.initialized = false;
        self.partially_prepared = false;
        self.streaming = false;
        self.released = true;
        info!("session released");
        Ok(())
    }

    /// Send a configuration command to both channels.
    ///
    /// For commands the device answers (see [`SessionConfig::write_prefixes`]), waits
    /// for the response and returns the most recent status text from either side.
    pub fn config_board(&mut self, config: &str) -> Result<Option<String>> {
        self.dispatch(config, |channel, text| channel.config_board(text))
    }

    /// Send a raw command to both channels. Same response handling as `config_board`.
    pub fn send_command(&mut self, command: &str) -> Result<Option<String>> {
        self.dispatch(command, |channel, text| channel.send_command(text))
    }

    fn dispatch<F>(&mut self, text: &str, mut send: F) -> Result<Option<String>>
    where
        F: FnMut(&mut dyn Channel, &str) -> Result<()>,
    {
        if !self.initialized {
            return Err(SessionError::BoardNotCreated);
        }
        if text.is_empty() {
            return Err(SessionError::InvalidArguments("empty command".to_string()));
        }

        send(self.left.as_mut(), text)?;
        send(self.right.as_mut(), text)?;

        if !self.config.expects_status_response(text) {
            return Ok(None);
        }

        thread::sleep(self.config.status_response_delay());
        let latest = latest_status(self.left.take_status(), self.right.take_status());
        if let Some(report) = &latest {
            debug!(side = %report.side, status = %report.text, "status response");
        }
        Ok(latest.map(|report| report.text))
    }
}

fn latest_status(
    left: Option<StatusReport>,
    right: Option<StatusReport>,
) -> Option<StatusReport> {
    match (left, right) {
        (Some(l), Some(r)) => Some(if r.received_at > l.received_at { r } else { l }),
        (l, r) => l.or(r),
    }
}

impl Drop for ChannelCoordinator {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            warn!(%err, "release on drop failed");
        }
    }
}

impl std::fmt::Debug for ChannelCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelCoordinator")
            .field("state", &self.state())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    use earlink_frame::Sample;

    use super::*;
    use crate::channel::lock;
    use crate::wireless::tests::MockLink;
    use crate::wireless::WirelessChannel;

    type CallLog = Arc<Mutex<Vec<String>>>;

    #[derive(Default, Clone, Copy)]
    struct Failures {
        prepare: bool,
        start: bool,
        stop: bool,
        release: bool,
        send: bool,
    }

    struct MockChannel {
        side: Side,
        log: CallLog,
        fail: Failures,
        streaming: bool,
        status: Option<StatusReport>,
    }

    impl MockChannel {
        fn new(side: Side, log: &CallLog) -> Self {
            Self {
                side,
                log: Arc::clone(log),
                fail: Failures::default(),
                streaming: false,
                status: None,
            }
        }

        fn failing(mut self, fail: Failures) -> Self {
            self.fail = fail;
            self
        }

        fn with_status(mut self, text: &str, received_at: Instant) -> Self {
            self.status = Some(StatusReport {
                side: self.side,
                text: text.to_string(),
                version: 4,
                received_at,
            });
            self
        }

        fn record(&self, op: &str) {
            lock(&self.log).push(format!("{}:{op}", self.side));
        }

        fn outcome(failed: bool) -> Result<()> {
            if failed {
                Err(SessionError::Link("scripted failure".to_string()))
            } else {
                Ok(())
            }
        }
    }

    impl Channel for MockChannel {
        fn side(&self) -> Side {
            self.side
        }

        fn prepare(&mut self) -> Result<()> {
            self.record("prepare");
            Self::outcome(self.fail.prepare)
        }

        fn start(&mut self) -> Result<()> {
            self.record("start");
            Self::outcome(self.fail.start)?;
            self.streaming = true;
            Ok(())
        }

        fn stop(&mut self) -> Result<()> {
            self.record("stop");
            Self::outcome(self.fail.stop)?;
            self.streaming = false;
            Ok(())
        }

        fn release(&mut self) -> Result<()> {
            self.record("release");
            Self::outcome(self.fail.release)
        }

        fn send_command(&mut self, command: &str) -> Result<()> {
            self.record(&format!("send {command}"));
            Self::outcome(self.fail.send)
        }

        fn take_status(&mut self) -> Option<StatusReport> {
            self.status.take()
        }

        fn is_streaming(&self) -> bool {
            self.streaming
        }
    }

    fn fast_config() -> SessionConfig {
        SessionConfig::default().with_status_response_delay(Duration::ZERO)
    }

    fn session(left: MockChannel, right: MockChannel) -> ChannelCoordinator {
        ChannelCoordinator::new(left, right, fast_config())
    }

    fn calls(log: &CallLog) -> Vec<String> {
        lock(log).clone()
    }

    #[test]
    fn prepare_runs_left_then_right_once() {
        let log = CallLog::default();
        let mut session = session(
            MockChannel::new(Side::Left, &log),
            MockChannel::new(Side::Right, &log),
        );

        session.prepare().unwrap();
        session.prepare().unwrap();

        assert_eq!(calls(&log), vec!["left:prepare", "right:prepare"]);
        assert_eq!(session.state(), SessionState::Prepared);
    }

    #[test]
    fn left_prepare_failure_skips_right() {
        let log = CallLog::default();
        let mut session = session(
            MockChannel::new(Side::Left, &log).failing(Failures {
                prepare: true,
                ..Failures::default()
            }),
            MockChannel::new(Side::Right, &log),
        );

        assert!(session.prepare().is_err());
        assert_eq!(session.state(), SessionState::Uninitialized);

        session.release().unwrap();
        assert_eq!(calls(&log), vec!["left:prepare"]);
    }

    #[test]
    fn left_release_failure_skips_right_and_keeps_session() {
        let log = CallLog::default();
        let mut session = session(
            MockChannel::new(Side::Left, &log).failing(Failures {
                release: true,
                ..Failures::default()
            }),
            MockChannel::new(Side::Right, &log),
        );
        session.prepare().unwrap();

        assert!(session.release().is_err());
        assert!(session.is_prepared());
        assert_eq!(session.state(), SessionState::Prepared);
        assert!(!calls(&log).contains(&"right:release".to_string()));
    }

    #[test]
    fn left_send_failure_skips_right_and_returns_no_status() {
        let log = CallLog::default();
        let now = Instant::now();
        let mut session = session(
            MockChannel::new(Side::Left, &log)
                .failing(Failures {
                    send: true,
                    ..Failures::default()
                })
                .with_status("@AAVAA-4 left", now),
            MockChannel::new(Side::Right, &log).with_status("@AAVAA-4 right", now),
        );
        session.prepare().unwrap();

        assert!(session.config_board("w0110").is_err());
        assert!(session.send_command("~4").is_err());

        let log = calls(&log);
        assert!(log.contains(&"left:send w0110".to_string()));
        assert!(log.contains(&"left:send ~4".to_string()));
        assert!(!log.iter().any(|call| call.starts_with("right:send")));
        assert!(session.right.take_status().is_some());
    }

    #[test]
    fn left_start_failure_skips_right() {
        let log = CallLog::default();
        let mut session = session(
            MockChannel::new(Side::Left, &log).failing(Failures {
                start: true,
                ..Failures::default()
            }),
            MockChannel::new(Side::Right, &log),
        );
        session.prepare().unwrap();

        assert!(session.start().is_err());
        assert!(!session.is_streaming());
        assert!(!calls(&log).contains(&"right:start".to_string()));
    }

    #[test]
    fn right_start_failure_keeps_left_running() {
        let log = CallLog::default();
        let mut session = session(
            MockChannel::new(Side::Left, &log),
            MockChannel::new(Side::Right, &log).failing(Failures {
                start: true,
                ..Failures::default()
            }),
        );
        session.prepare().unwrap();

        assert!(session.start().is_err());
        assert!(!session.is_streaming());
        assert!(session.left().is_streaming());
        assert_eq!(session.state(), SessionState::Prepared);
    }

    #[test]
    fn stop_when_idle_still_reaches_both_sides() {
        let log = CallLog::default();
        let mut session = session(
            MockChannel::new(Side::Left, &log),
            MockChannel::new(Side::Right, &log),
        );

        session.stop().unwrap();

        assert_eq!(calls(&log), vec!["left:stop", "right:stop"]);
        assert!(!session.is_streaming());
    }

    #[test]
    fn left_stop_failure_keeps_streaming_flag() {
        let log = CallLog::default();
        let mut session = session(
            MockChannel::new(Side::Left, &log).failing(Failures {
                stop: true,
                ..Failures::default()
            }),
            MockChannel::new(Side::Right, &log),
        );
        session.prepare().unwrap();
        session.start().unwrap();

        assert!(session.stop().is_err());
        assert!(session.is_streaming());
        assert!(!calls(&log).contains(&"right:stop".to_string()));
    }

    #[test]
    fn lifecycle_errors() {
        let log = CallLog::default();
        let mut session = session(
            MockChannel::new(Side::Left, &log),
            MockChannel::new(Side::Right, &log),
        );

        assert!(matches!(session.start(), Err(SessionError::BoardNotCreated)));
        assert!(matches!(
            session.config_board("w1"),
            Err(SessionError::BoardNotCreated)
        ));

        session.prepare().unwrap();
        assert!(matches!(
            session.config_board(""),
            Err(SessionError::InvalidArguments(_))
        ));
        session.start().unwrap();
        assert!(matches!(
            session.start(),
            Err(SessionError::StreamAlreadyRunning)
        ));
        assert_eq!(session.state(), SessionState::Streaming);
    }

    #[test]
    fn partial_prepare_can_be_released() {
        let log = CallLog::default();
        let mut session = session(
            MockChannel::new(Side::Left, &log),
            MockChannel::new(Side::Right, &log).failing(Failures {
                prepare: true,
                ..Failures::default()
            }),
        );

        assert!(session.prepare().is_err());
        assert_eq!(session.state(), SessionState::Uninitialized);

        session.release().unwrap();
        assert_eq!(
            calls(&log),
            vec![
                "left:prepare",
                "right:prepare",
                "left:release",
                "right:release"
            ]
        );
        assert_eq!(session.state(), SessionState::Released);
    }

    #[test]
    fn release_without_prepare_is_a_no_op() {
        let log = CallLog::default();
        let mut session = session(
            MockChannel::new(Side::Left, &log),
            MockChannel::new(Side::Right, &log),
        );
        session.release().unwrap();
        assert!(calls(&log).is_empty());
    }

    #[test]
    fn write_command_returns_newest_status_and_clears_it() {
        let log = CallLog::default();
        let earlier = Instant::now();
        let later = earlier + Duration::from_millis(3);
        let mut session = session(
            MockChannel::new(Side::Left, &log).with_status("@AAVAA-4 left", earlier),
            MockChannel::new(Side::Right, &log).with_status("@AAVAA-4 right", later),
        );
        session.prepare().unwrap();

        let response = session.config_board("w0110").unwrap();
        assert_eq!(response.as_deref(), Some("@AAVAA-4 right"));
        assert_eq!(session.config_board("w0110").unwrap(), None);
        assert!(calls(&log).contains(&"right:send w0110".to_string()));
    }

    #[test]
    fn plain_command_skips_status_query() {
        let log = CallLog::default();
        let mut session = session(
            MockChannel::new(Side::Left, &log).with_status("@AAVAA-4 ", Instant::now()),
            MockChannel::new(Side::Right, &log),
        );
        session.prepare().unwrap();

        assert_eq!(session.send_command("b").unwrap(), None);
        assert_eq!(session.config_board("~4").unwrap().as_deref(), Some("@AAVAA-4 "));
    }

    #[test]
    fn status_response_waits_for_configured_delay() {
        let log = CallLog::default();
        let config =
            SessionConfig::default().with_status_response_delay(Duration::from_millis(30));
        let mut session = ChannelCoordinator::new(
            MockChannel::new(Side::Left, &log),
            MockChannel::new(Side::Right, &log),
            config,
        );
        session.prepare().unwrap();

        let began = Instant::now();
        session.config_board("w1").unwrap();
        assert!(began.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn drop_releases_session() {
        let log = CallLog::default();
        {
            let mut session = session(
                MockChannel::new(Side::Left, &log),
                MockChannel::new(Side::Right, &log),
            );
            session.prepare().unwrap();
        }
        let calls = calls(&log);
        assert_eq!(&calls[calls.len() - 2..], ["left:release", "right:release"]);
    }

    #[test]
    fn wireless_pair_reports_status_from_notifications() {
        let config = fast_config();
        let discard = |_: Sample| {};
        let left = WirelessChannel::new(Side::Left, MockLink::default(), discard, &config).unwrap();
        let right = WirelessChannel::new(Side::Right, MockLink::default(), discard, &config).unwrap();
        let right_handler = right.handler();
        let mut session = ChannelCoordinator::new(left, right, config);
        session.prepare().unwrap();

        right_handler.on_notification(b"\x01@AAVAA-4 gain 12");
        let response = session.config_board("w0112").unwrap();

        assert_eq!(response.as_deref(), Some("@AAVAA-4 gain 12"));
        session.start().unwrap();
        assert!(right_handler.is_streaming());
    }
}
