use crate::aggregator::TrackingAggregator;
use crate::config::{Config, SharedConfig};
use crate::detection::{Frame, HandDetection, HeadDetection, LandmarkDetector};
use crate::events::EventBus;
use crate::server::TransportServer;
use crate::state::DeviceState;
use crate::types::{ControllerState, HeadState, HeadsetState};
use crate::Result;
use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Outstanding detection requests allowed per detector.
pub const MAX_IN_FLIGHT: usize = 2;

pub type HeadDetector = dyn LandmarkDetector<Output = HeadDetection>;
pub type HandDetector = dyn LandmarkDetector<Output = HandDetection>;

/// Backpressure for one detector: at most `max_in_flight` outstanding
/// requests, dispatched no more often than the caller's minimum interval.
/// Frames that do not get a permit are dropped.
#[derive(Debug)]
pub struct DispatchThrottle {
    in_flight: Arc<AtomicUsize>,
    max_in_flight: usize,
    last_dispatch: Mutex<Option<Instant>>,
}

/// One granted dispatch. The slot is released when the permit is dropped,
/// normally once the detector's callback has run.
#[derive(Debug)]
pub struct DispatchPermit {
    in_flight: Arc<AtomicUsize>,
}

impl Drop for DispatchPermit {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Minimum time between dispatches for an FPS cap; 0 means uncapped.
pub fn frame_interval(fps_cap: u32) -> Duration {
    if fps_cap == 0 {
        Duration::ZERO
    } else {
        Duration::from_secs(1) / fps_cap
    }
}

impl DispatchThrottle {
    pub fn new(max_in_flight: usize) -> Self {
        Self {
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight,
            last_dispatch: Mutex::new(None),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn try_acquire(&self, min_interval: Duration) -> Option<DispatchPermit> {
        self.try_acquire_at(Instant::now(), min_interval)
    }

    /// Grant a dispatch at time `now`, or `None` if the frame must be dropped.
    pub fn try_acquire_at(&self, now: Instant, min_interval: Duration) -> Option<DispatchPermit> {
        let mut last_dispatch = self.last_dispatch.lock().ok()?;

        if let Some(last) = *last_dispatch {
            if now.saturating_duration_since(last) < min_interval {
                return None;
            }
        }
        if self.in_flight.load(Ordering::Acquire) >= self.max_in_flight {
            return None;
        }

        self.in_flight.fetch_add(1, Ordering::AcqRel);
        *last_dispatch = Some(now);
        Some(DispatchPermit {
            in_flight: self.in_flight.clone(),
        })
    }
}

/// State reachable from detector callbacks.
struct Pipeline {
    aggregator: TrackingAggregator,
    /// Cleared on shutdown; callbacks arriving afterwards are discarded.
    accepting: AtomicBool,
}

impl Pipeline {
    fn on_head_result(&self, result: Result<HeadDetection>) -> Option<HeadsetState> {
        if !self.accepting.load(Ordering::Acquire) {
            log::trace!("Discarding late head result");
            return None;
        }
        match result.and_then(|detection| detection.to_head_state()) {
            Ok(head) => Some(self.aggregator.on_head(head)),
            Err(e) => {
                log::warn!("Head detection dropped: {}", e);
                None
            }
        }
    }

    fn on_hand_result(
        &self,
        result: Result<HandDetection>,
        timestamp: u64,
    ) -> Option<(ControllerState, ControllerState)> {
        if !self.accepting.load(Ordering::Acquire) {
            log::trace!("Discarding late hand result");
            return None;
        }
        match result.and_then(|detection| detection.to_hand_states(timestamp)) {
            Ok((left, right)) => Some(self.aggregator.on_hands(left, right)),
            Err(e) => {
                log::warn!("Hand detection dropped: {}", e);
                None
            }
        }
    }
}

/// The running tracker: detectors, aggregation and the runtime transport.
///
/// ```no_run
/// use aether::{Config, SharedConfig, Tracker};
///
/// let config = SharedConfig::new(Config::load_or_default("config.json"));
/// let mut tracker = Tracker::start(config)?;
/// // tracker.submit_frame(frame) from the capture thread...
/// tracker.shutdown();
/// # Ok::<(), aether::AetherError>(())
/// ```
pub struct Tracker {
    config: SharedConfig,
    pipeline: Arc<Pipeline>,
    device: Arc<DeviceState>,
    events: Arc<EventBus>,
    server: Option<TransportServer>,
    head_detector: Option<Box<HeadDetector>>,
    hand_detector: Option<Box<HandDetector>>,
    head_throttle: DispatchThrottle,
    hand_throttle: DispatchThrottle,
    dispatching: AtomicBool,
    epoch: Instant,
    last_timestamp: AtomicU64,
}

impl Tracker {
    /// Start serving on the loopback port from the config.
    pub fn start(config: SharedConfig) -> Result<Tracker> {
        let port = config.snapshot().port;
        Self::start_on(config, SocketAddr::from((Ipv4Addr::LOCALHOST, port)))
    }

    pub fn start_on<A: ToSocketAddrs>(config: SharedConfig, addr: A) -> Result<Tracker> {
        let snapshot = config.snapshot();
        snapshot.validate()?;

        let device = Arc::new(DeviceState::new());
        let events = Arc::new(EventBus::new());
        let server = TransportServer::start(addr, device.clone(), events.clone())?;
        let pipeline = Arc::new(Pipeline {
            aggregator: TrackingAggregator::new(config.clone(), device.clone()),
            accepting: AtomicBool::new(true),
        });

        Ok(Tracker {
            head_throttle: DispatchThrottle::new(MAX_IN_FLIGHT),
            hand_throttle: DispatchThrottle::new(MAX_IN_FLIGHT),
            config,
            pipeline,
            device,
            events,
            server: Some(server),
            head_detector: None,
            hand_detector: None,
            dispatching: AtomicBool::new(true),
            epoch: Instant::now(),
            last_timestamp: AtomicU64::new(0),
        })
    }

    pub fn with_head_detector<D>(mut self, detector: D) -> Self
    where
        D: LandmarkDetector<Output = HeadDetection> + 'static,
    {
        self.head_detector = Some(Box::new(detector));
        self
    }

    pub fn with_hand_detector<D>(mut self, detector: D) -> Self
    where
        D: LandmarkDetector<Output = HandDetection> + 'static,
    {
        self.hand_detector = Some(Box::new(detector));
        self
    }

    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    /// Swap in a new configuration, picked up by the next frame and the
    /// next detection cycle.
    pub fn reload_config(&self, config: Config) -> Result<()> {
        self.config.replace(config)
    }

    pub fn device(&self) -> &Arc<DeviceState> {
        &self.device
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.as_ref().map(|s| s.local_addr())
    }

    pub fn is_connected(&self) -> bool {
        self.server.as_ref().is_some_and(|s| s.is_connected())
    }

    /// Strictly increasing nanoseconds since the tracker started.
    fn next_timestamp(&self) -> u64 {
        let now = self.epoch.elapsed().as_nanos() as u64;
        let prev = self
            .last_timestamp
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| Some(now.max(last + 1)))
            .unwrap_or(now);
        now.max(prev + 1)
    }

    /// Hand a captured frame to the detectors. Frames arriving faster than
    /// the FPS cap or the detectors allow are dropped.
    pub fn submit_frame(&self, frame: Frame) {
        if !self.dispatching.load(Ordering::Acquire) {
            return;
        }
        let timestamp = self.next_timestamp();
        let min_interval = frame_interval(self.config.snapshot().tracking_fps_cap);

        if let Some(detector) = &self.head_detector {
            match self.head_throttle.try_acquire(min_interval) {
                Some(permit) => {
                    let pipeline = self.pipeline.clone();
                    detector.detect_async(
                        frame.clone(),
                        timestamp,
                        Box::new(move |result| {
                            pipeline.on_head_result(result);
                            drop(permit);
                        }),
                    );
                }
                None => log::trace!("Head detector busy, dropping frame {}", timestamp),
            }
        }

        if let Some(detector) = &self.hand_detector {
            match self.hand_throttle.try_acquire(min_interval) {
                Some(permit) => {
                    let pipeline = self.pipeline.clone();
                    detector.detect_async(
                        frame,
                        timestamp,
                        Box::new(move |result| {
                            pipeline.on_hand_result(result, timestamp);
                            drop(permit);
                        }),
                    );
                }
                None => log::trace!("Hand detector busy, dropping frame {}", timestamp),
            }
        }
    }

    /// Feed a head detection produced outside the tracker's detectors.
    pub fn submit_head_detection(&self, detection: HeadDetection) -> Option<HeadsetState> {
        self.pipeline.on_head_result(Ok(detection))
    }

    /// Feed an already converted head state.
    pub fn submit_head_state(&self, head: HeadState) -> Option<HeadsetState> {
        if !self.pipeline.accepting.load(Ordering::Acquire) {
            return None;
        }
        Some(self.pipeline.aggregator.on_head(head))
    }

    /// Feed a hand detection produced outside the tracker's detectors.
    pub fn submit_hand_detection(
        &self,
        detection: HandDetection,
    ) -> Option<(ControllerState, ControllerState)> {
        let timestamp = self.next_timestamp();
        self.pipeline.on_hand_result(Ok(detection), timestamp)
    }

    /// Stop dispatching, close the callback boundary, then stop the
    /// transport. Detectors are released last, when the tracker is dropped.
    pub fn shutdown(&mut self) {
        if self.server.is_none() {
            return;
        }
        log::info!("Tracker shutting down");
        self.dispatching.store(false, Ordering::Release);
        self.pipeline.accepting.store(false, Ordering::Release);
        if let Some(server) = self.server.take() {
            server.stop();
        }
    }
}

impl Drop for Tracker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
