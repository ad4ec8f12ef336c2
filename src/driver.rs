// sidcan/src/driver.rs
//
// The refresh driver that keeps text on the SID.
//
// This file is part of the Rust 'sidcan' library.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! The display driver.
//!
//! The display only keeps showing text as long as it keeps receiving it, so
//! the driver runs a background thread that re-sends the current text every
//! refresh interval (200 ms by default). The application just sets the
//! rows whenever it likes; a change shows up with the next refresh.
//!
//! The transport belongs to the refresh thread while the driver runs. When
//! the driver is shut down, the thread is stopped and joined, and then one
//! last burst with blank rows is sent so that no stale text is left on the
//! display.

use crate::{Burst, CanSocket, DisplayLine, Error, IoError, Result, Transport};
use log::{debug, error, trace, warn};
use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Condvar, Mutex, MutexGuard, PoisonError,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

/// How often the text is re-sent, unless configured otherwise.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(200);

// ===== DriverConfig =====

/// Settings for a display driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverConfig {
    /// The time between the starts of two refreshes.
    pub refresh_interval: Duration,
}

impl DriverConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the time between refreshes.
    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
        }
    }
}

// ===== DriverState =====

/// The life cycle of a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverState {
    /// The text is being refreshed.
    Running,
    /// The driver was shut down. It never runs again.
    Stopped,
}

/// Counters for the refreshes done by a driver.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RefreshStats {
    /// Bursts that were sent completely.
    pub bursts_sent: u64,
    /// Bursts in which at least one frame failed to send.
    pub bursts_failed: u64,
}

// ===== Shared state =====

#[derive(Debug, Default, Clone, Copy)]
struct Lines {
    upper: DisplayLine,
    lower: DisplayLine,
}

// State shared between the driver handle and the refresh thread.
#[derive(Debug)]
struct Shared {
    lines: Mutex<Lines>,
    state: Mutex<DriverState>,
    state_changed: Condvar,
    bursts_sent: AtomicU64,
    bursts_failed: AtomicU64,
}

impl Shared {
    fn new() -> Self {
        Self {
            lines: Mutex::new(Lines::default()),
            state: Mutex::new(DriverState::Running),
            state_changed: Condvar::new(),
            bursts_sent: AtomicU64::new(0),
            bursts_failed: AtomicU64::new(0),
        }
    }

    // The guarded values are plain data that can't be left half-updated,
    // so a poisoned lock is still usable.
    fn lines(&self) -> MutexGuard<'_, Lines> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> MutexGuard<'_, DriverState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_running(&self) -> bool {
        *self.state() == DriverState::Running
    }

    fn stop(&self) {
        *self.state() = DriverState::Stopped;
        self.state_changed.notify_all();
    }

    /// Waits for the deadline to pass, returning early if the driver is
    /// stopped. Returns whether the driver is still running.
    fn wait_until(&self, deadline: Instant) -> bool {
        let timeout = deadline.saturating_duration_since(Instant::now());
        let (state, _) = self
            .state_changed
            .wait_timeout_while(self.state(), timeout, |state| {
                *state == DriverState::Running
            })
            .unwrap_or_else(PoisonError::into_inner);
        *state == DriverState::Running
    }

    /// Sends one burst with the given text, keeping count of the outcome.
    fn send<T: Transport>(&self, transport: &mut T, lines: &Lines) -> bool {
        let burst = Burst::from_lines(&lines.upper, &lines.lower);
        match transport.transmit_burst(&burst) {
            Ok(()) => {
                self.bursts_sent.fetch_add(1, Ordering::Relaxed);
                trace!("SID: [{}] [{}]", lines.upper, lines.lower);
                true
            }
            Err(err) => {
                self.bursts_failed.fetch_add(1, Ordering::Relaxed);
                warn!("SID refresh failed: {}", err);
                false
            }
        }
    }
}

/// The body of the refresh thread.
///
/// Hands the transport back when the driver is stopped.
fn refresh_loop<T: Transport>(shared: &Shared, mut transport: T, interval: Duration) -> T {
    debug!("SID refresh started, every {:?}", interval);

    let mut deadline = Instant::now();
    while shared.is_running() {
        // Copy out, so the setters are never held up by the bus.
        let lines = *shared.lines();
        shared.send(&mut transport, &lines);

        deadline += interval;
        let now = Instant::now();
        if deadline < now {
            // Fell behind on a slow bus. Skip the missed ticks.
            deadline = now + interval;
        }

        if !shared.wait_until(deadline) {
            break;
        }
    }

    debug!("SID refresh stopped");
    transport
}

// ===== SidDriver =====

/// A driver that keeps two rows of text on the display.
///
/// The text is re-sent from a background thread until the driver is shut
/// down, either explicitly with [`SidDriver::shutdown`] or by dropping it.
/// Both leave the display blank.
pub struct SidDriver<T: Transport + Send + 'static> {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<T>>,
}

impl SidDriver<CanSocket> {
    /// Opens a driver on the named CAN interface, like "can0".
    ///
    /// The `timeout` bounds how long sending a single frame may block. With
    /// `None` a write blocks until the frame is queued.
    pub fn open(iface: &str, timeout: Option<Duration>) -> Result<Self> {
        Self::open_with_config(iface, timeout, DriverConfig::default())
    }

    /// Opens a driver on the named CAN interface with the given settings.
    pub fn open_with_config(
        iface: &str,
        timeout: Option<Duration>,
        config: DriverConfig,
    ) -> Result<Self> {
        let open_err = |source: IoError| Error::Open {
            iface: iface.to_string(),
            source,
        };

        let sock = CanSocket::open(iface).map_err(open_err)?;
        sock.set_write_timeout(timeout).map_err(open_err)?;
        sock.set_filter_drop_all().map_err(open_err)?;

        debug!("Opened SID on '{}', write timeout {:?}", iface, timeout);
        Self::with_config(sock, config)
    }
}

impl<T: Transport + Send + 'static> SidDriver<T> {
    /// Starts a driver sending through the given transport.
    pub fn new(transport: T) -> Result<Self> {
        Self::with_config(transport, DriverConfig::default())
    }

    /// Starts a driver sending through the given transport, with the given
    /// settings.
    pub fn with_config(transport: T, config: DriverConfig) -> Result<Self> {
        let shared = Arc::new(Shared::new());

        let worker = {
            let shared = Arc::clone(&shared);
            let interval = config.refresh_interval;
            thread::Builder::new()
                .name("sid-refresh".into())
                .spawn(move || refresh_loop(&shared, transport, interval))
                .map_err(Error::Spawn)?
        };

        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    /// Sets the text of the top row.
    ///
    /// The text is padded or cut to fit the row, and is shown from the next
    /// refresh on.
    pub fn set_upper(&self, text: &str) {
        let line = DisplayLine::new(text);
        self.shared.lines().upper = line;
    }

    /// Sets the text of the bottom row.
    ///
    /// The text is padded or cut to fit the row, and is shown from the next
    /// refresh on.
    pub fn set_lower(&self, text: &str) {
        let line = DisplayLine::new(text);
        self.shared.lines().lower = line;
    }

    /// Sets the text of both rows at once, so that no refresh can show one
    /// new row with one old one.
    pub fn set_text(&self, upper: &str, lower: &str) {
        let lines = Lines {
            upper: DisplayLine::new(upper),
            lower: DisplayLine::new(lower),
        };
        *self.shared.lines() = lines;
    }

    /// Gets the text currently shown, as (upper, lower).
    pub fn text(&self) -> (DisplayLine, DisplayLine) {
        let lines = *self.shared.lines();
        (lines.upper, lines.lower)
    }

    /// Gets the state of the driver.
    pub fn state(&self) -> DriverState {
        *self.shared.state()
    }

    /// Gets the refresh counters.
    pub fn stats(&self) -> RefreshStats {
        RefreshStats {
            bursts_sent: self.shared.bursts_sent.load(Ordering::Relaxed),
            bursts_failed: self.shared.bursts_failed.load(Ordering::Relaxed),
        }
    }

    /// Stops the driver and blanks the display.
    ///
    /// This waits for the refresh thread to finish, then sends one burst
    /// with blank rows. A failure to send that is only logged. The
    /// transport is handed back.
    pub fn shutdown(mut self) -> Result<T> {
        // The worker is only ever taken here or on drop.
        self.stop()?.ok_or(Error::WorkerPanicked)
    }

    fn stop(&mut self) -> Result<Option<T>> {
        let Some(worker) = self.worker.take() else {
            return Ok(None);
        };

        self.shared.stop();
        let mut transport = worker.join().map_err(|_| {
            error!("SID refresh thread panicked");
            Error::WorkerPanicked
        })?;

        let blank = Lines::default();
        *self.shared.lines() = blank;
        if !self.shared.send(&mut transport, &blank) {
            warn!("Could not blank the SID on shutdown");
        }
        Ok(Some(transport))
    }
}

impl<T: Transport + Send + 'static> Drop for SidDriver<T> {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            error!("Error stopping the SID driver: {}", err);
        }
    }
}

impl<T: Transport + Send + 'static> fmt::Debug for SidDriver<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let (upper, lower) = self.text();
        f.debug_struct("SidDriver")
            .field("state", &self.state())
            .field("upper", &upper)
            .field("lower", &lower)
            .finish_non_exhaustive()
    }
}

/////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{encoder::BURST_LEN, CanFrame, TextFrame, TransportError};
    use embedded_can::Frame as EmbeddedFrame;
    use std::sync::{
        atomic::AtomicUsize,
        mpsc::{self, Receiver, Sender},
    };

    const FAST: Duration = Duration::from_millis(5);
    const PATIENCE: Duration = Duration::from_secs(5);

    // Forwards every frame to the test.
    struct ChannelBus(Sender<CanFrame>);

    impl Transport for ChannelBus {
        fn transmit(&mut self, frame: &CanFrame) -> std::result::Result<(), TransportError> {
            let _ = self.0.send(*frame);
            Ok(())
        }
    }

    // Fails every frame, counting the attempts.
    struct DeadBus(Arc<AtomicUsize>);

    impl Transport for DeadBus {
        fn transmit(&mut self, _frame: &CanFrame) -> std::result::Result<(), TransportError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(TransportError::Timeout)
        }
    }

    // Drops the third text frame of every burst, forwarding the rest.
    struct LossyBus(Sender<CanFrame>);

    impl Transport for LossyBus {
        fn transmit(&mut self, frame: &CanFrame) -> std::result::Result<(), TransportError> {
            if frame.raw_id() == 0x337 && frame.data()[0] & 0x07 == 3 {
                return Err(TransportError::Timeout);
            }
            let _ = self.0.send(*frame);
            Ok(())
        }
    }

    fn fast_driver() -> (SidDriver<ChannelBus>, Receiver<CanFrame>) {
        let (tx, rx) = mpsc::channel();
        let config = DriverConfig::new().refresh_interval(FAST);
        let sid = SidDriver::with_config(ChannelBus(tx), config).unwrap();
        (sid, rx)
    }

    fn next_burst(rx: &Receiver<CanFrame>) -> Vec<CanFrame> {
        (0..BURST_LEN)
            .map(|_| rx.recv_timeout(PATIENCE).unwrap())
            .collect()
    }

    fn burst_text(frames: &[CanFrame]) -> (String, String) {
        let text: Vec<TextFrame> = frames[..6]
            .iter()
            .map(|frame| TextFrame::decode(frame.data()).unwrap())
            .collect();
        let row = |frames: &[TextFrame]| frames.iter().map(TextFrame::text).collect::<String>();
        (row(&text[..3]), row(&text[3..]))
    }

    fn wait_for_text(rx: &Receiver<CanFrame>, upper: &str, lower: &str) -> Vec<CanFrame> {
        loop {
            let frames = next_burst(rx);
            let (u, l) = burst_text(&frames);
            if u == upper && l == lower {
                return frames;
            }
        }
    }

    #[test]
    fn test_config() {
        assert_eq!(DEFAULT_REFRESH_INTERVAL, DriverConfig::default().refresh_interval);

        let config = DriverConfig::new().refresh_interval(Duration::from_millis(50));
        assert_eq!(Duration::from_millis(50), config.refresh_interval);
    }

    #[test]
    fn test_starts_blank() {
        let (sid, rx) = fast_driver();

        assert_eq!(DriverState::Running, sid.state());
        assert!(sid.text().0.is_blank());
        assert!(sid.text().1.is_blank());

        let (upper, lower) = burst_text(&next_burst(&rx));
        assert_eq!("            ", upper);
        assert_eq!("            ", lower);
    }

    #[test]
    fn test_refreshes_current_text() {
        let (sid, rx) = fast_driver();

        sid.set_upper("HELLO");
        sid.set_lower("WORLD");
        assert_eq!("HELLO       ", sid.text().0.as_str());

        let frames = wait_for_text(&rx, "HELLO       ", "WORLD       ");

        let ids: Vec<u32> = frames.iter().map(CanFrame::raw_id).collect();
        assert_eq!(vec![0x337, 0x337, 0x337, 0x337, 0x337, 0x337, 0x357], ids);
        assert_eq!(&[0x45, 0x96, 0x81, b'H', b'E', b'L', b'L', b'O'], frames[0].data());
        assert_eq!(&[0x02, 0x96, 0x82, b'W', b'O', b'R', b'L', b'D'], frames[3].data());

        // and it keeps coming
        let (upper, lower) = burst_text(&next_burst(&rx));
        assert_eq!("HELLO       ", upper);
        assert_eq!("WORLD       ", lower);
    }

    #[test]
    fn test_set_text() {
        let (sid, rx) = fast_driver();

        sid.set_text("Range 120 km", "Fuel 10 L");
        wait_for_text(&rx, "Range 120 km", "Fuel 10 L   ");
    }

    #[test]
    fn test_shutdown_blanks() {
        let (sid, rx) = fast_driver();

        sid.set_text("HELLO", "WORLD");
        wait_for_text(&rx, "HELLO       ", "WORLD       ");

        let bus = sid.shutdown().unwrap();

        let frames: Vec<CanFrame> = rx.try_iter().collect();
        assert_eq!(0, frames.len() % BURST_LEN);
        let (upper, lower) = burst_text(&frames[frames.len() - BURST_LEN..]);
        assert_eq!("            ", upper);
        assert_eq!("            ", lower);

        // Nothing more once the driver is gone
        thread::sleep(FAST * 4);
        assert!(rx.try_recv().is_err());
        drop(bus);
    }

    #[test]
    fn test_drop_blanks() {
        let (sid, rx) = fast_driver();

        sid.set_upper("STALE");
        wait_for_text(&rx, "STALE       ", "            ");
        drop(sid);

        let frames: Vec<CanFrame> = rx.iter().collect();
        let (upper, _) = burst_text(&frames[frames.len() - BURST_LEN..]);
        assert_eq!("            ", upper);
    }

    #[test]
    fn test_shutdown_is_prompt() {
        let (tx, rx) = mpsc::channel();
        let config = DriverConfig::new().refresh_interval(Duration::from_secs(60));
        let sid = SidDriver::with_config(ChannelBus(tx), config).unwrap();

        // Let the first refresh go out, so the thread is sleeping.
        next_burst(&rx);

        let start = Instant::now();
        sid.shutdown().unwrap();
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_failed_frame_does_not_cut_burst() {
        let (tx, rx) = mpsc::channel();
        let config = DriverConfig::new().refresh_interval(FAST);
        let sid = SidDriver::with_config(LossyBus(tx), config).unwrap();

        // One burst minus the lost frame, still ending in the terminator.
        let frames: Vec<CanFrame> = (0..BURST_LEN - 1)
            .map(|_| rx.recv_timeout(PATIENCE).unwrap())
            .collect();
        let orders: Vec<u8> = frames[..5].iter().map(|f| f.data()[0] & 0x07).collect();
        assert_eq!(vec![5, 4, 2, 1, 0], orders);
        assert_eq!(0x357, frames[5].raw_id());

        let start = Instant::now();
        while sid.stats().bursts_failed < 1 {
            assert!(start.elapsed() < PATIENCE);
            thread::sleep(FAST);
        }
        assert_eq!(0, sid.stats().bursts_sent);

        sid.shutdown().unwrap();
    }

    #[test]
    fn test_failures_keep_refreshing() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let config = DriverConfig::new().refresh_interval(FAST);
        let sid = SidDriver::with_config(DeadBus(Arc::clone(&attempts)), config).unwrap();

        let start = Instant::now();
        while sid.stats().bursts_failed < 3 {
            assert!(start.elapsed() < PATIENCE);
            thread::sleep(FAST);
        }

        // Every frame of a failed burst is still tried.
        let stats = sid.stats();
        assert_eq!(0, stats.bursts_sent);
        let burst_len = BURST_LEN as u64;
        assert!(attempts.load(Ordering::SeqCst) as u64 >= burst_len * stats.bursts_failed);
        assert_eq!(DriverState::Running, sid.state());

        // Blanking fails too, but shutdown still works.
        assert!(sid.shutdown().is_ok());
    }
}
