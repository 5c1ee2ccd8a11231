//! Capture session
//!
//! [`CaptureSession`] owns a capture backend, the frame buffer, the address
//! filters and the packet handler, and runs the receive/decode/filter/
//! dispatch pump one step at a time.
//!
//! ```text
//! Created --add filter--> Configured --start--> Bound --> Running
//!    |                        |                   |          |
//!    |                        |                   |        stop
//!    |                        |                   |          v
//!    +------------------------+------clear--------+------ Stopped
//!                                      |
//!                                      v
//!                                   Cleared
//! ```
//!
//! All methods take `&self`. One thread may loop on
//! [`process_next_packet`](CaptureSession::process_next_packet) while another
//! calls [`stop`](CaptureSession::stop); the session lock is held for a whole
//! pump step, so the socket is never closed in the middle of a receive and
//! `stop` waits at most one poll timeout.

use crate::error::{PlatformError, Result, StateError};
use crate::traits::CaptureBackend;
use nsniff_core::config::{CaptureConfig, DEFAULT_POLL_TIMEOUT_MS};
use nsniff_core::dedup::{DedupGuard, Verdict};
use nsniff_core::filter::{AddressFilter, Direction, FilterSet, DEFAULT_MAX_FILTERS};
use nsniff_core::packet::{DecodedPacket, Protocol, MAX_FRAME_SIZE};
use nsniff_core::TimeInfo;
use parking_lot::Mutex;
use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Socket open, no filters yet
    Created,
    /// At least one filter added
    Configured,
    /// Socket bound to the interface, start not yet complete
    Bound,
    /// Capturing
    Running,
    /// Socket closed
    Stopped,
    /// All resources released
    Cleared,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionState::Created => "created",
            SessionState::Configured => "configured",
            SessionState::Bound => "bound",
            SessionState::Running => "running",
            SessionState::Stopped => "stopped",
            SessionState::Cleared => "cleared",
        })
    }
}

/// Session options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Raise promiscuous mode while running
    pub promiscuous: bool,
    /// Hand the Ethernet header to the handler
    pub include_link_header: bool,
    /// Readiness wait per pump step
    pub poll_timeout: Duration,
    /// Maximum number of address filters
    pub max_filters: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            promiscuous: false,
            include_link_header: false,
            poll_timeout: Duration::from_millis(DEFAULT_POLL_TIMEOUT_MS),
            max_filters: DEFAULT_MAX_FILTERS,
        }
    }
}

impl From<&CaptureConfig> for SessionOptions {
    fn from(config: &CaptureConfig) -> Self {
        Self {
            promiscuous: config.promiscuous,
            include_link_header: config.include_link_header,
            poll_timeout: Duration::from_millis(config.poll_timeout_ms),
            max_filters: config.max_filters,
        }
    }
}

/// Counters kept by a session
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CaptureStats {
    /// Frames received from the socket
    pub received: u64,
    /// Frames handed to the handler
    pub delivered: u64,
    /// Frames no filter matched
    pub filtered: u64,
    /// Frames dropped as duplicates
    pub duplicates: u64,
    /// Frames that were not decodable IPv4
    pub undecodable: u64,
}

/// A frame passed to the packet handler
///
/// Borrows the session's buffer, so it cannot outlive the handler call.
#[derive(Debug)]
pub struct CapturedFrame<'a> {
    /// Frame bytes, starting at the IP header unless the link header was
    /// requested
    pub data: &'a [u8],
    /// Bytes received from the socket
    pub len: usize,
    /// Capture time
    pub timestamp: TimeInfo,
    /// Decoded headers, offsets relative to the received frame
    pub packet: &'a DecodedPacket,
    base: usize,
}

impl<'a> CapturedFrame<'a> {
    /// Whether `data` starts with the Ethernet header
    pub fn includes_link_header(&self) -> bool {
        self.base == 0 && self.packet.ethernet.is_some()
    }

    /// IP header bytes
    pub fn ip_header(&self) -> &'a [u8] {
        let range = self.packet.ip_header_range();
        self.data
            .get(range.start - self.base..range.end - self.base)
            .unwrap_or(&[])
    }

    /// Payload bytes following the transport header
    pub fn payload(&self) -> &'a [u8] {
        self.data
            .get(self.packet.payload_offset - self.base..self.packet.datagram_end() - self.base)
            .unwrap_or(&[])
    }
}

/// Packet callback
pub type PacketHandler = Box<dyn FnMut(&CapturedFrame<'_>) + Send>;

struct Inner {
    backend: Option<Box<dyn CaptureBackend>>,
    state: SessionState,
    options: SessionOptions,
    filters: FilterSet,
    handler: Option<PacketHandler>,
    buffer: Vec<u8>,
    guard: Option<DedupGuard>,
    promiscuous_active: bool,
    last_error: Option<String>,
    stats: CaptureStats,
}

impl Inner {
    fn fail<T>(&mut self, err: PlatformError) -> Result<T> {
        self.last_error = Some(err.to_string());
        Err(err)
    }

    fn ensure_configurable(&mut self) -> Result<()> {
        match self.state {
            SessionState::Created | SessionState::Configured => Ok(()),
            SessionState::Cleared => self.fail(StateError::Cleared.into()),
            SessionState::Stopped => self.fail(StateError::Stopped.into()),
            SessionState::Bound | SessionState::Running => {
                self.fail(StateError::AlreadyStarted.into())
            }
        }
    }

    fn pump(&mut self) -> Result<bool> {
        let (Some(backend), Some(handler)) = (self.backend.as_mut(), self.handler.as_mut()) else {
            return Err(StateError::NotRunning.into());
        };

        if !backend.poll(self.options.poll_timeout)? {
            return Ok(false);
        }

        self.buffer.fill(0);
        let Some(meta) = backend.recv(&mut self.buffer)? else {
            return Ok(false);
        };
        self.stats.received += 1;

        let frame = &self.buffer[..meta.len.min(self.buffer.len())];
        let packet = match DecodedPacket::decode(frame, backend.link_layer()) {
            Ok(packet) => packet,
            Err(e) => {
                self.stats.undecodable += 1;
                trace!(len = frame.len(), error = %e, "Skipping frame");
                return Ok(false);
            }
        };

        let endpoints = packet.endpoints();
        if let Some(dedup) = &self.guard {
            if let Verdict::Discard(reason) =
                dedup.check(meta.delivery, endpoints.source, endpoints.destination)
            {
                self.stats.duplicates += 1;
                debug!(?reason, src = %endpoints.source, dst = %endpoints.destination, "Dropped duplicate");
                return Ok(false);
            }
        }

        if !self.filters.matches(&endpoints) {
            self.stats.filtered += 1;
            return Ok(false);
        }

        let base = if self.options.include_link_header {
            0
        } else {
            packet.ip_offset
        };
        let captured = CapturedFrame {
            data: &frame[base..],
            len: meta.len,
            timestamp: TimeInfo::now(),
            packet: &packet,
            base,
        };
        handler(&captured);
        self.stats.delivered += 1;
        Ok(true)
    }

    fn release(&mut self) {
        if let Some(mut backend) = self.backend.take() {
            if self.promiscuous_active {
                if let Err(e) = backend.set_promiscuous(false) {
                    warn!(error = %e, "Failed to clear promiscuous mode");
                }
                self.promiscuous_active = false;
            }
            if let Err(e) = backend.close() {
                warn!(error = %e, "Failed to close capture socket");
            }
        }
        self.handler = None;
        self.buffer = Vec::new();
        self.last_error = None;
        self.state = SessionState::Cleared;
    }
}

/// A packet capture session on one interface
pub struct CaptureSession {
    interface: String,
    inner: Mutex<Inner>,
}

impl CaptureSession {
    /// Open the platform backend for `interface`
    pub fn create(interface: &str, options: SessionOptions) -> Result<Self> {
        let backend = crate::open_backend()?;
        Ok(Self::from_boxed(interface, backend, options))
    }

    /// Use a specific backend
    pub fn with_backend<B>(interface: &str, backend: B, options: SessionOptions) -> Self
    where
        B: CaptureBackend + 'static,
    {
        Self::from_boxed(interface, Box::new(backend), options)
    }

    fn from_boxed(interface: &str, backend: Box<dyn CaptureBackend>, options: SessionOptions) -> Self {
        debug!(interface, ?options, "Creating capture session");
        Self {
            interface: interface.to_string(),
            inner: Mutex::new(Inner {
                backend: Some(backend),
                state: SessionState::Created,
                filters: FilterSet::with_max(options.max_filters),
                options,
                handler: None,
                buffer: vec![0u8; MAX_FRAME_SIZE],
                guard: None,
                promiscuous_active: false,
                last_error: None,
                stats: CaptureStats::default(),
            }),
        }
    }

    /// Parse `"IP:PORT"` and add it as a filter
    pub fn add_address_filter(
        &self,
        address: &str,
        direction: Direction,
        protocol: Protocol,
    ) -> Result<()> {
        let filter = match AddressFilter::parse(address) {
            Ok(f) => f.with_direction(direction).with_protocol(protocol),
            Err(e) => return self.inner.lock().fail(e.into()),
        };
        self.add_filter(filter)
    }

    /// Add a parsed filter
    pub fn add_filter(&self, filter: AddressFilter) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.ensure_configurable()?;
        if let Err(e) = inner.filters.add(filter) {
            return inner.fail(e.into());
        }
        inner.state = SessionState::Configured;
        debug!(%filter, count = inner.filters.len(), "Added address filter");
        Ok(())
    }

    /// Register the packet callback
    pub fn set_handler<F>(&self, handler: F) -> Result<()>
    where
        F: FnMut(&CapturedFrame<'_>) + Send + 'static,
    {
        let mut inner = self.inner.lock();
        if inner.state == SessionState::Cleared {
            return inner.fail(StateError::Cleared.into());
        }
        inner.handler = Some(Box::new(handler));
        Ok(())
    }

    /// Request promiscuous mode for the next start
    pub fn set_promiscuous(&self, enabled: bool) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.ensure_configurable()?;
        inner.options.promiscuous = enabled;
        Ok(())
    }

    /// Hand frames to the handler starting at the Ethernet header
    pub fn set_include_link_header(&self, include: bool) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.ensure_configurable()?;
        inner.options.include_link_header = include;
        Ok(())
    }

    /// Resolve and bind the interface and start capturing
    ///
    /// On failure the session keeps whatever it acquired; [`clear`](Self::clear)
    /// releases it.
    pub fn start(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.ensure_configurable()?;

        let Some(mut backend) = inner.backend.take() else {
            return inner.fail(StateError::Cleared.into());
        };
        let result = self.bring_up(&mut inner, backend.as_mut());
        inner.backend = Some(backend);

        match result {
            Ok(()) => {
                inner.state = SessionState::Running;
                info!(
                    interface = %self.interface,
                    filters = inner.filters.len(),
                    promiscuous = inner.promiscuous_active,
                    "Capture started"
                );
                Ok(())
            }
            Err(e) => {
                warn!(interface = %self.interface, error = %e, "Capture start failed");
                inner.fail(e)
            }
        }
    }

    fn bring_up(&self, inner: &mut Inner, backend: &mut dyn CaptureBackend) -> Result<()> {
        let info = backend.resolve(&self.interface)?;
        inner.guard = Some(DedupGuard::new(info.ipv4));

        backend.bind(&info)?;
        inner.state = SessionState::Bound;

        if inner.options.promiscuous {
            // Only a session that raised the flag clears it again
            inner.promiscuous_active = backend.set_promiscuous(true)?;
        }
        Ok(())
    }

    /// Run one pump step
    ///
    /// Waits up to the poll timeout for a frame, receives at most one and
    /// delivers it if it passes the duplicate guard and the filters. Returns
    /// `true` when the handler was invoked.
    pub fn process_next_packet(&self) -> Result<bool> {
        let mut inner = self.inner.lock();

        match inner.state {
            SessionState::Running => {}
            _ => return inner.fail(StateError::NotRunning.into()),
        }
        if inner.handler.is_none() {
            return inner.fail(StateError::NoHandler.into());
        }

        match inner.pump() {
            Ok(delivered) => Ok(delivered),
            Err(e) => {
                warn!(interface = %self.interface, error = %e, "Receive failed");
                inner.fail(e)
            }
        }
    }

    /// Stop capturing
    ///
    /// Clears promiscuous mode if this session raised it and closes the
    /// socket. The session ends up Stopped even when clearing promiscuous
    /// mode fails; that error is still returned.
    pub fn stop(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.state != SessionState::Running {
            return inner.fail(StateError::NotRunning.into());
        }

        let mut result = Ok(());
        if let Some(mut backend) = inner.backend.take() {
            if inner.promiscuous_active {
                if let Err(e) = backend.set_promiscuous(false) {
                    result = Err(e);
                }
                inner.promiscuous_active = false;
            }
            if let Err(e) = backend.close() {
                result = result.and(Err(e));
            }
        }

        inner.state = SessionState::Stopped;
        info!(interface = %self.interface, stats = ?inner.stats, "Capture stopped");

        match result {
            Ok(()) => Ok(()),
            Err(e) => inner.fail(e),
        }
    }

    /// Release every resource the session holds
    ///
    /// Safe in any state and idempotent.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        if inner.state != SessionState::Cleared {
            inner.release();
            debug!(interface = %self.interface, "Capture session cleared");
        }
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    /// Check if the session is capturing
    pub fn is_running(&self) -> bool {
        self.state() == SessionState::Running
    }

    /// Counters so far
    pub fn stats(&self) -> CaptureStats {
        self.inner.lock().stats
    }

    /// Address of the bound interface, once started
    pub fn local_ip(&self) -> Option<Ipv4Addr> {
        self.inner.lock().guard.map(|g| g.local_ip())
    }

    /// Text of the most recent error
    pub fn last_error(&self) -> Option<String> {
        self.inner.lock().last_error.clone()
    }

    /// Interface identifier
    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Number of address filters
    pub fn filter_count(&self) -> usize {
        self.inner.lock().filters.len()
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        if inner.state != SessionState::Cleared {
            inner.release();
        }
    }
}

impl fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureSession")
            .field("interface", &self.interface)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{InterfaceInfo, MockCaptureBackend, RecvMeta};
    use mockall::predicate::*;
    use nsniff_core::Delivery;
    use std::sync::{Arc, Mutex as StdMutex};

    const LOCAL: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);

    /// IPv4/TCP 10.0.0.2:40000 -> 10.0.0.1:8080, 40 bytes, no payload
    fn tcp_frame() -> Vec<u8> {
        vec![
            0x45, 0x00, 0x00, 0x28, //
            0x00, 0x01, 0x40, 0x00, //
            0x40, 0x06, 0x00, 0x00, //
            0x0A, 0x00, 0x00, 0x02, //
            0x0A, 0x00, 0x00, 0x01, //
            0x9C, 0x40, 0x1F, 0x90, // 40000 -> 8080
            0x00, 0x00, 0x00, 0x01, //
            0x00, 0x00, 0x00, 0x00, //
            0x50, 0x02, 0x72, 0x10, //
            0x00, 0x00, 0x00, 0x00, //
        ]
    }

    fn expect_start(mock: &mut MockCaptureBackend) {
        mock.expect_resolve()
            .withf(|iface| iface == "test0")
            .times(1)
            .returning(|_| Ok(InterfaceInfo { index: 7, ipv4: LOCAL }));
        mock.expect_bind().times(1).returning(|_| Ok(()));
    }

    fn expect_frame(mock: &mut MockCaptureBackend, frame: Vec<u8>, delivery: Option<Delivery>) {
        mock.expect_poll().times(1).returning(|_| Ok(true));
        mock.expect_recv().times(1).returning(move |buf| {
            buf[..frame.len()].copy_from_slice(&frame);
            Ok(Some(RecvMeta {
                len: frame.len(),
                delivery,
            }))
        });
    }

    #[test]
    fn test_process_when_not_running_touches_nothing() {
        let mut mock = MockCaptureBackend::new();
        mock.expect_poll().times(0);
        mock.expect_recv().times(0);
        mock.expect_close().times(1).returning(|| Ok(()));

        let session = CaptureSession::with_backend("test0", mock, SessionOptions::default());
        session.set_handler(|_| {}).unwrap();

        let err = session.process_next_packet().unwrap_err();
        assert!(matches!(err, PlatformError::State(StateError::NotRunning)));
        assert_eq!(
            session.last_error().as_deref(),
            Some("Invalid session state: this sniffer is not started")
        );
    }

    #[test]
    fn test_end_to_end_delivery() {
        let mut mock = MockCaptureBackend::new();
        expect_start(&mut mock);
        mock.expect_link_layer().return_const(false);
        expect_frame(&mut mock, tcp_frame(), None);
        mock.expect_close().times(1).returning(|| Ok(()));

        let session = CaptureSession::with_backend("test0", mock, SessionOptions::default());
        session
            .add_address_filter("any:0", Direction::Any, Protocol::Any)
            .unwrap();

        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        session
            .set_handler(move |frame| {
                let ports = frame.packet.transport.ports();
                sink.lock().unwrap().push((frame.len, frame.data.len(), ports));
            })
            .unwrap();

        session.start().unwrap();
        assert_eq!(session.state(), SessionState::Running);
        assert_eq!(session.local_ip(), Some(LOCAL));

        assert!(session.process_next_packet().unwrap());
        assert_eq!(*seen.lock().unwrap(), vec![(40, 40, (40000, 8080))]);

        session.stop().unwrap();
        assert_eq!(session.state(), SessionState::Stopped);
        assert_eq!(session.stats().delivered, 1);
    }

    #[test]
    fn test_link_header_stripped_unless_requested() {
        let mut frame = vec![0u8; 12];
        frame.extend_from_slice(&[0x08, 0x00]);
        frame.extend_from_slice(&tcp_frame());

        for include in [false, true] {
            let mut mock = MockCaptureBackend::new();
            expect_start(&mut mock);
            mock.expect_link_layer().return_const(true);
            expect_frame(&mut mock, frame.clone(), Some(Delivery::HostBound));
            mock.expect_close().returning(|| Ok(()));

            let session = CaptureSession::with_backend("test0", mock, SessionOptions::default());
            session.add_filter(AddressFilter::ANY).unwrap();
            session.set_include_link_header(include).unwrap();

            let seen = Arc::new(StdMutex::new(None));
            let sink = Arc::clone(&seen);
            session
                .set_handler(move |f| {
                    *sink.lock().unwrap() = Some((f.len, f.data.len(), f.ip_header().len(), f.payload().len()));
                })
                .unwrap();
            session.start().unwrap();
            assert!(session.process_next_packet().unwrap());

            let expected_data = if include { 54 } else { 40 };
            assert_eq!(*seen.lock().unwrap(), Some((54, expected_data, 20, 0)));
        }
    }

    #[test]
    fn test_payload_stops_at_ip_total_length() {
        let mut frame = vec![0u8; 12];
        frame.extend_from_slice(&[0x08, 0x00]);
        frame.extend_from_slice(&tcp_frame());
        frame.extend_from_slice(&[0xAA; 6]); // Ethernet padding

        let mut mock = MockCaptureBackend::new();
        expect_start(&mut mock);
        mock.expect_link_layer().return_const(true);
        expect_frame(&mut mock, frame, Some(Delivery::HostBound));
        mock.expect_close().returning(|| Ok(()));

        let session = CaptureSession::with_backend("test0", mock, SessionOptions::default());
        session.add_filter(AddressFilter::ANY).unwrap();
        let seen = Arc::new(StdMutex::new(None));
        let sink = Arc::clone(&seen);
        session
            .set_handler(move |f| *sink.lock().unwrap() = Some((f.len, f.payload().len())))
            .unwrap();
        session.start().unwrap();
        assert!(session.process_next_packet().unwrap());

        assert_eq!(*seen.lock().unwrap(), Some((60, 0)));
    }

    #[test]
    fn test_timeout_processes_nothing() {
        let mut mock = MockCaptureBackend::new();
        expect_start(&mut mock);
        mock.expect_poll()
            .with(eq(Duration::from_millis(1000)))
            .times(1)
            .returning(|_| Ok(false));
        mock.expect_recv().times(0);
        mock.expect_close().returning(|| Ok(()));

        let session = CaptureSession::with_backend("test0", mock, SessionOptions::default());
        session.add_filter(AddressFilter::ANY).unwrap();
        session.set_handler(|_| panic!("no frame expected")).unwrap();
        session.start().unwrap();

        assert!(!session.process_next_packet().unwrap());
        assert_eq!(session.stats().received, 0);
    }

    #[test]
    fn test_duplicate_is_discarded() {
        let mut frame = vec![0u8; 12];
        frame.extend_from_slice(&[0x08, 0x00]);
        let mut ip = tcp_frame();
        ip[12..16].copy_from_slice(&[10, 0, 0, 1]); // src == dst
        frame.extend_from_slice(&ip);

        let mut mock = MockCaptureBackend::new();
        expect_start(&mut mock);
        mock.expect_link_layer().return_const(true);
        expect_frame(&mut mock, frame, Some(Delivery::Outgoing));
        mock.expect_close().returning(|| Ok(()));

        let session = CaptureSession::with_backend("test0", mock, SessionOptions::default());
        session.add_filter(AddressFilter::ANY).unwrap();
        session.set_handler(|_| panic!("duplicate delivered")).unwrap();
        session.start().unwrap();

        assert!(!session.process_next_packet().unwrap());
        assert_eq!(session.stats().duplicates, 1);
    }

    #[test]
    fn test_unmatched_frame_counted() {
        let mut mock = MockCaptureBackend::new();
        expect_start(&mut mock);
        mock.expect_link_layer().return_const(false);
        expect_frame(&mut mock, tcp_frame(), None);
        mock.expect_close().returning(|| Ok(()));

        let session = CaptureSession::with_backend("test0", mock, SessionOptions::default());
        session
            .add_address_filter("any:53", Direction::Any, Protocol::Udp)
            .unwrap();
        session.set_handler(|_| panic!("filtered frame delivered")).unwrap();
        session.start().unwrap();

        assert!(!session.process_next_packet().unwrap());
        assert_eq!(session.stats().filtered, 1);
    }

    #[test]
    fn test_start_failure_after_bind_is_clearable() {
        let mut mock = MockCaptureBackend::new();
        expect_start(&mut mock);
        mock.expect_set_promiscuous()
            .with(eq(true))
            .times(1)
            .returning(|_| Err(PlatformError::PromiscMode("EPERM".into())));
        mock.expect_close().times(1).returning(|| Ok(()));

        let options = SessionOptions {
            promiscuous: true,
            ..SessionOptions::default()
        };
        let session = CaptureSession::with_backend("test0", mock, options);
        session.add_filter(AddressFilter::ANY).unwrap();

        let err = session.start().unwrap_err();
        assert!(matches!(err, PlatformError::PromiscMode(_)));
        assert_eq!(session.state(), SessionState::Bound);
        assert!(session.last_error().is_some());

        session.clear();
        session.clear();
        assert_eq!(session.state(), SessionState::Cleared);
        assert!(session.last_error().is_none());
    }

    #[test]
    fn test_stop_clears_promiscuous_mode() {
        let mut mock = MockCaptureBackend::new();
        expect_start(&mut mock);
        let mut seq = mockall::Sequence::new();
        mock.expect_set_promiscuous()
            .with(eq(true))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(true));
        mock.expect_set_promiscuous()
            .with(eq(false))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(true));
        mock.expect_close().times(1).in_sequence(&mut seq).returning(|| Ok(()));

        let session = CaptureSession::with_backend("test0", mock, SessionOptions::default());
        session.set_promiscuous(true).unwrap();
        session.add_filter(AddressFilter::ANY).unwrap();
        session.start().unwrap();
        session.stop().unwrap();

        assert!(matches!(
            session.stop(),
            Err(PlatformError::State(StateError::NotRunning))
        ));
    }

    #[test]
    fn test_stop_leaves_foreign_promiscuous_flag() {
        let mut mock = MockCaptureBackend::new();
        expect_start(&mut mock);
        // Interface was already promiscuous, so nothing changed
        mock.expect_set_promiscuous()
            .with(eq(true))
            .times(1)
            .returning(|_| Ok(false));
        mock.expect_set_promiscuous().with(eq(false)).times(0);
        mock.expect_close().times(1).returning(|| Ok(()));

        let session = CaptureSession::with_backend("test0", mock, SessionOptions::default());
        session.set_promiscuous(true).unwrap();
        session.add_filter(AddressFilter::ANY).unwrap();
        session.start().unwrap();
        session.stop().unwrap();
        session.clear();
    }

    #[test]
    fn test_process_after_clear_is_not_running() {
        let mut mock = MockCaptureBackend::new();
        expect_start(&mut mock);
        mock.expect_poll().times(0);
        mock.expect_recv().times(0);
        mock.expect_close().times(1).returning(|| Ok(()));

        let session = CaptureSession::with_backend("test0", mock, SessionOptions::default());
        session.add_filter(AddressFilter::ANY).unwrap();
        session.set_handler(|_| {}).unwrap();
        session.start().unwrap();
        session.clear();

        assert!(matches!(
            session.process_next_packet(),
            Err(PlatformError::State(StateError::NotRunning))
        ));
        assert!(matches!(
            session.stop(),
            Err(PlatformError::State(StateError::NotRunning))
        ));
    }

    #[test]
    fn test_configuration_rejected_after_start() {
        let mut mock = MockCaptureBackend::new();
        expect_start(&mut mock);
        mock.expect_close().returning(|| Ok(()));

        let session = CaptureSession::with_backend("test0", mock, SessionOptions::default());
        session.start().unwrap();

        assert!(matches!(
            session.add_address_filter("any:80", Direction::Any, Protocol::Tcp),
            Err(PlatformError::State(StateError::AlreadyStarted))
        ));
        assert!(matches!(
            session.set_include_link_header(true),
            Err(PlatformError::State(StateError::AlreadyStarted))
        ));
        assert!(matches!(
            session.start(),
            Err(PlatformError::State(StateError::AlreadyStarted))
        ));
    }

    #[test]
    fn test_missing_handler() {
        let mut mock = MockCaptureBackend::new();
        expect_start(&mut mock);
        mock.expect_poll().times(0);
        mock.expect_close().returning(|| Ok(()));

        let session = CaptureSession::with_backend("test0", mock, SessionOptions::default());
        session.add_filter(AddressFilter::ANY).unwrap();
        session.start().unwrap();

        assert!(matches!(
            session.process_next_packet(),
            Err(PlatformError::State(StateError::NoHandler))
        ));
    }

    #[test]
    fn test_receive_failure_is_runtime_error() {
        let mut mock = MockCaptureBackend::new();
        expect_start(&mut mock);
        mock.expect_poll().returning(|_| Ok(true));
        mock.expect_recv()
            .returning(|_| Err(PlatformError::Runtime("recvfrom(..): EIO".into())));
        mock.expect_close().returning(|| Ok(()));

        let session = CaptureSession::with_backend("test0", mock, SessionOptions::default());
        session.add_filter(AddressFilter::ANY).unwrap();
        session.set_handler(|_| {}).unwrap();
        session.start().unwrap();

        let err = session.process_next_packet().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Runtime);
        assert!(session.last_error().unwrap().contains("EIO"));
    }

    #[test]
    fn test_capacity_bound_from_options() {
        let mut mock = MockCaptureBackend::new();
        mock.expect_close().returning(|| Ok(()));

        let options = SessionOptions {
            max_filters: 2,
            ..SessionOptions::default()
        };
        let session = CaptureSession::with_backend("test0", mock, options);
        session.add_filter(AddressFilter::ANY).unwrap();
        session.add_filter(AddressFilter::ANY).unwrap();

        let err = session.add_filter(AddressFilter::ANY).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Configuration);
        assert_eq!(session.filter_count(), 2);
    }

    #[test]
    fn test_invalid_address_rejected() {
        let mut mock = MockCaptureBackend::new();
        mock.expect_close().returning(|| Ok(()));

        let session = CaptureSession::with_backend("test0", mock, SessionOptions::default());
        let err = session
            .add_address_filter("localhost", Direction::Any, Protocol::Any)
            .unwrap_err();
        assert!(matches!(
            err,
            PlatformError::Core(nsniff_core::Error::InvalidAddressFormat { .. })
        ));
        assert_eq!(session.state(), SessionState::Created);
    }
}
