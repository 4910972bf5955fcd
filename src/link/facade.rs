//! Application façade: the single object the CLI (and any other front
//! end) talks to. It wires modem, codec and session together, owns the
//! decoder and control threads, and publishes everything observable on
//! one event channel. It holds no domain state of its own.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::audio::LinkShared;
use super::event::{InviteDetails, LinkEvent};
use super::transmit::{FrameKind, TxScheduler};
use crate::error::Result;
use crate::frame::{encode_frame_bits, FrameDecoder};
use crate::modem::{DetectorConfig, ModemMode, ToneDetector, ToneGenerator};
use crate::session::{Datagram, Effect, Peer, PeerTable, Room, RoomOptions, SessionManager};
use crate::utils::consts::*;

/// Construction-time configuration. Persistent storage is read at the
/// binary's edge; the link itself only ever sees this record.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub user_id: String,
    pub username: String,
    pub mode: ModemMode,
    /// 0..=100, mapped linearly to output amplitude.
    pub volume: u8,
    pub sample_rate: f32,
    /// Start capture and timers as soon as the front end is ready.
    pub auto_discovery: bool,
    pub detector: DetectorConfig,
}

impl LinkConfig {
    pub fn new(user_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            mode: ModemMode::High,
            volume: 80,
            sample_rate: SAMPLE_RATE as f32,
            auto_discovery: true,
            detector: DetectorConfig::default(),
        }
    }
}

/// Renders datagrams to PCM and hands them to the transmit scheduler.
/// Shared between the façade and its worker threads.
#[derive(Clone)]
struct Transmitter {
    tx: Arc<Mutex<TxScheduler>>,
    mode: Arc<Mutex<ModemMode>>,
    volume: Arc<AtomicU8>,
    generator: ToneGenerator,
}

impl Transmitter {
    fn render(&self, datagram: &Datagram) -> Result<Vec<f32>> {
        let wire = datagram.encode_wire()?;
        let bits = encode_frame_bits(wire.as_bytes())?;
        let mode = *self.mode.lock().unwrap();
        let volume = self.volume.load(Ordering::Relaxed).min(100) as f32 / 100.0;
        Ok(self.generator.render(&bits, &mode.profile(), volume))
    }

    fn send_background(&self, datagram: &Datagram, kind: FrameKind) {
        match self.render(datagram) {
            Ok(samples) => self.tx.lock().unwrap().enqueue(samples, kind),
            Err(e) => warn!("dropping unencodable datagram: {}", e),
        }
    }

    fn send_foreground(&self, datagram: &Datagram) -> Result<()> {
        let samples = self.render(datagram)?;
        self.tx.lock().unwrap().send_now(samples)
    }
}

fn apply_effects(effects: Vec<Effect>, events: &Sender<LinkEvent>, transmitter: &Transmitter) {
    for effect in effects {
        match effect {
            Effect::Emit(event) => {
                let _ = events.send(event);
            }
            Effect::Send(datagram) => transmitter.send_background(&datagram, FrameKind::Control),
        }
    }
}

pub struct AcousticLink {
    shared: LinkShared,
    events: Sender<LinkEvent>,
    session: Arc<Mutex<SessionManager>>,
    discovery_peers: Arc<Mutex<PeerTable>>,
    transmitter: Transmitter,
    mode: Arc<Mutex<ModemMode>>,
    volume: Arc<AtomicU8>,
    sample_rate: f32,
    detector_config: DetectorConfig,
    auto_discovery: bool,
    capture_rx: Receiver<Vec<f32>>,
    running: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl AcousticLink {
    pub fn new(
        config: LinkConfig,
        shared: LinkShared,
        capture_rx: Receiver<Vec<f32>>,
        events: Sender<LinkEvent>,
    ) -> Self {
        let mode = Arc::new(Mutex::new(config.mode));
        let volume = Arc::new(AtomicU8::new(config.volume.min(100)));
        let tx = Arc::new(Mutex::new(TxScheduler::new(shared.clone())));

        let transmitter = Transmitter {
            tx,
            mode: mode.clone(),
            volume: volume.clone(),
            generator: ToneGenerator::new(config.sample_rate),
        };

        Self {
            shared,
            events,
            session: Arc::new(Mutex::new(SessionManager::new(
                config.user_id.clone(),
                config.username,
            ))),
            discovery_peers: Arc::new(Mutex::new(PeerTable::new(
                config.user_id,
                Duration::from_millis(DISCOVERY_PEER_EXPIRY_MS),
            ))),
            transmitter,
            mode,
            volume,
            sample_rate: config.sample_rate,
            detector_config: config.detector,
            auto_discovery: config.auto_discovery,
            capture_rx,
            running: Arc::new(AtomicBool::new(false)),
            handles: Vec::new(),
        }
    }

    pub fn auto_discovery(&self) -> bool {
        self.auto_discovery
    }

    pub fn user_id(&self) -> String {
        self.session.lock().unwrap().user_id().to_string()
    }

    pub fn username(&self) -> String {
        self.session.lock().unwrap().username().to_string()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Spin up the decoder and control threads, open the capture gate,
    /// and announce ourselves once.
    pub fn start_discovery(&mut self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!("starting discovery");

        self.shared.capturing.store(true, Ordering::SeqCst);
        let decoder = self.spawn_decoder();
        let control = self.spawn_control();
        self.handles.push(decoder);
        self.handles.push(control);

        let announce = self.session.lock().unwrap().discovery_announce();
        self.transmitter
            .send_background(&announce, FrameKind::Control);
        Ok(())
    }

    /// Stop capture within one device buffer, cancel the timers, and
    /// drop queued frames. An in-flight frame is allowed to finish.
    pub fn stop_discovery(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("stopping discovery");

        self.shared.capturing.store(false, Ordering::SeqCst);
        self.transmitter.tx.lock().unwrap().drain();

        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
        let _ = self
            .events
            .send(LinkEvent::DiscoveryStopped { reason: None });
    }

    /// Send a chat line to the current room. Failures (no room, payload
    /// too large, transmit slot busy) surface both as the returned error
    /// and once on the event channel.
    pub fn send_chat(&self, text: &str) -> Result<()> {
        let attempt: Result<()> = (|| {
            let (datagram, echo) = self.session.lock().unwrap().build_chat(text)?;
            self.transmitter.send_foreground(&datagram)?;
            let _ = self.events.send(LinkEvent::MessageReceived(echo));
            Ok(())
        })();

        if let Err(e) = &attempt {
            let _ = self.events.send(LinkEvent::SendFailed {
                reason: e.to_string(),
            });
        }
        attempt
    }

    pub fn create_or_join_room(&self, opts: RoomOptions) {
        let effects = self.session.lock().unwrap().create_or_join_room(opts);
        apply_effects(effects, &self.events, &self.transmitter);
    }

    pub fn invite_peer(&self, user_id: &str) -> Result<()> {
        let attempt: Result<()> = (|| {
            let invite = self.session.lock().unwrap().build_invite(user_id)?;
            self.transmitter.send_background(&invite, FrameKind::Control);
            Ok(())
        })();

        if let Err(e) = &attempt {
            let _ = self.events.send(LinkEvent::SendFailed {
                reason: e.to_string(),
            });
        }
        attempt
    }

    pub fn accept_invite(&self, invite: &InviteDetails) {
        let effects = self.session.lock().unwrap().accept_invite(invite);
        apply_effects(effects, &self.events, &self.transmitter);
    }

    pub fn leave_room(&self) {
        let effects = self.session.lock().unwrap().leave_room();
        apply_effects(effects, &self.events, &self.transmitter);
    }

    pub fn toggle_privacy(&self) -> Result<()> {
        let effects = self.session.lock().unwrap().toggle_privacy()?;
        apply_effects(effects, &self.events, &self.transmitter);
        Ok(())
    }

    /// Switch FSK profiles. The decoder thread rebuilds its detector at
    /// the next loop turn.
    pub fn set_mode(&self, mode: ModemMode) {
        info!("modem mode set to {}", mode.name());
        *self.mode.lock().unwrap() = mode;
    }

    pub fn set_volume(&self, volume: u8) {
        self.volume.store(volume.min(100), Ordering::Relaxed);
    }

    pub fn list_peers(&self) -> Vec<Peer> {
        self.discovery_peers
            .lock()
            .unwrap()
            .snapshot(Instant::now())
    }

    pub fn current_room(&self) -> Option<Room> {
        self.session.lock().unwrap().current_room().cloned()
    }

    fn spawn_decoder(&self) -> JoinHandle<()> {
        let running = self.running.clone();
        let capture_rx = self.capture_rx.clone();
        let session = self.session.clone();
        let discovery_peers = self.discovery_peers.clone();
        let events = self.events.clone();
        let transmitter = self.transmitter.clone();
        let mode = self.mode.clone();
        let sample_rate = self.sample_rate;
        let detector_config = self.detector_config;

        thread::Builder::new()
            .name("sl-decoder".to_string())
            .spawn(move || {
                let mut current_mode = *mode.lock().unwrap();
                let mut detector =
                    ToneDetector::new(current_mode.profile(), sample_rate, detector_config);
                let mut decoder = FrameDecoder::new();

                while running.load(Ordering::SeqCst) {
                    let wanted_mode = *mode.lock().unwrap();
                    if wanted_mode != current_mode {
                        current_mode = wanted_mode;
                        detector = ToneDetector::new(
                            current_mode.profile(),
                            sample_rate,
                            detector_config,
                        );
                        decoder.reset();
                    }

                    let chunk = match capture_rx.recv_timeout(Duration::from_millis(100)) {
                        Ok(chunk) => chunk,
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => break,
                    };

                    let bits: Vec<u8> =
                        detector.process(&chunk).iter().map(|e| e.value).collect();
                    if bits.is_empty() {
                        continue;
                    }

                    for payload in decoder.push_bits(&bits) {
                        dispatch_payload(
                            &payload,
                            &session,
                            &discovery_peers,
                            &events,
                            &transmitter,
                        );
                    }
                }
                debug!("decoder thread exiting");
            })
            .expect("spawn decoder thread")
    }

    fn spawn_control(&self) -> JoinHandle<()> {
        let running = self.running.clone();
        let session = self.session.clone();
        let discovery_peers = self.discovery_peers.clone();
        let events = self.events.clone();
        let transmitter = self.transmitter.clone();
        let shared = self.shared.clone();

        thread::Builder::new()
            .name("sl-control".to_string())
            .spawn(move || {
                let heartbeat_every = Duration::from_millis(HEARTBEAT_INTERVAL_MS);
                let sweep_every = Duration::from_millis(PEER_SWEEP_INTERVAL_MS);
                let advert_every = Duration::from_millis(ROOM_ADVERT_INTERVAL_MS);

                let started = Instant::now();
                let mut next_heartbeat = started + heartbeat_every;
                let mut next_sweep = started + sweep_every;
                let mut next_advert = started + advert_every;

                while running.load(Ordering::SeqCst) {
                    thread::sleep(Duration::from_millis(50));
                    let now = Instant::now();

                    if now >= next_heartbeat {
                        let heartbeat = session.lock().unwrap().heartbeat();
                        transmitter.send_background(&heartbeat, FrameKind::Control);
                        next_heartbeat = now + heartbeat_every;
                    }

                    if now >= next_sweep {
                        let lost = discovery_peers.lock().unwrap().sweep(now);
                        for peer in lost {
                            let _ = events.send(LinkEvent::PeerLost {
                                user_id: peer.user_id,
                                username: peer.username,
                            });
                        }
                        let effects = session.lock().unwrap().sweep(now);
                        apply_effects(effects, &events, &transmitter);
                        next_sweep = now + sweep_every;
                    }

                    if now >= next_advert {
                        if let Some(advert) = session.lock().unwrap().room_advert() {
                            transmitter.send_background(&advert, FrameKind::Control);
                        }
                        next_advert = now + advert_every;
                    }

                    transmitter
                        .tx
                        .lock()
                        .unwrap()
                        .pump(shared.channel_busy());
                }
                debug!("control thread exiting");
            })
            .expect("spawn control thread")
    }
}

impl Drop for AcousticLink {
    fn drop(&mut self) {
        self.stop_discovery();
    }
}

/// Decode one frame payload into a datagram and run it through the
/// session layer. Undecodable payloads are dropped silently; the channel
/// is lossy by design.
fn dispatch_payload(
    payload: &[u8],
    session: &Arc<Mutex<SessionManager>>,
    discovery_peers: &Arc<Mutex<PeerTable>>,
    events: &Sender<LinkEvent>,
    transmitter: &Transmitter,
) {
    let Ok(text) = std::str::from_utf8(payload) else {
        debug!("dropped non-UTF-8 payload");
        return;
    };

    let datagram = match Datagram::parse_wire(text) {
        Ok(datagram) => datagram,
        Err(e) => {
            debug!("{}", e);
            return;
        }
    };

    let now = Instant::now();
    // Any datagram carrying a sender keeps that peer on the radar; on a
    // lossy channel, live chat traffic must count even when the 3 s
    // heartbeats happen to drop.
    if let Some(sender) = datagram.sender_id() {
        let username = match &datagram {
            Datagram::Heartbeat { username, .. }
            | Datagram::Discovery { username, .. } => username.as_str(),
            _ => "",
        };
        discovery_peers
            .lock()
            .unwrap()
            .observe(sender, username, now);
    }

    let effects = session.lock().unwrap().handle_datagram(datagram, now);
    apply_effects(effects, events, transmitter);
}
