/// Nominal sample rate (Hz); the link adapts to whatever the device supplies.
pub const SAMPLE_RATE: u32 = 48000;

/// Log level (overridable via RUST_LOG).
pub const LOG_LEVEL: &str = "info";

/// JACK client name.
pub const JACK_CLIENT_NAME: &str = "soniclink";

/// Input port name.
pub const INPUT_PORT_NAME: &str = "sl_in";

/// Output port name.
pub const OUTPUT_PORT_NAME: &str = "sl_out";

/// Progress update interval (ms).
pub const PROGRESS_UPDATE_INTERVAL_MS: u64 = 50;

/// Settings file name, resolved under $HOME.
pub const SETTINGS_FILE: &str = ".soniclink.json";

// ============================================================================
// Modem Parameters
// ============================================================================

/// High-rate profile: space/mark frequencies (Hz) and bit rate (bit/s).
pub const HIGH_FREQ_0: f32 = 18_700.0;
pub const HIGH_FREQ_1: f32 = 19_300.0;
pub const HIGH_BIT_RATE: f32 = 40.0;

/// Low-rate profile, for noisier rooms and cheaper speakers.
pub const LOW_FREQ_0: f32 = 17_500.0;
pub const LOW_FREQ_1: f32 = 18_100.0;
pub const LOW_BIT_RATE: f32 = 10.0;

/// Detector evaluation window (samples).
pub const GOERTZEL_WINDOW: usize = 4096;

/// Magnitude threshold for the Goertzel path (linear, input in [-1, 1]).
pub const DETECT_THRESHOLD_LINEAR: f32 = 0.01;

/// Magnitude threshold for the FFT fallback path (dBFS).
pub const DETECT_THRESHOLD_DB: f32 = -60.0;

/// A bit event closer than this fraction of a bit period to the previous
/// one is a re-detection of the same tone and is dropped.
pub const BIT_DUP_SUPPRESSION: f32 = 0.8;

// ============================================================================
// Frame Parameters
// ============================================================================

/// Sync header, transmitted as whole bytes (one byte per element).
pub const SYNC_HEADER: [u8; 8] = [1, 0, 1, 0, 1, 1, 0, 1];

/// Maximum payload per frame (bytes); frames claiming more are false syncs.
pub const MAX_PAYLOAD_BYTES: usize = 32;

/// Sync (8) + length (1) + checksum (1).
pub const FRAME_OVERHEAD_BYTES: usize = 10;

/// Received-bit buffer cap; the oldest half is dropped when it fills.
pub const BIT_BUFFER_CAP: usize = 1000;

// ============================================================================
// Session Parameters
// ============================================================================

/// Heartbeat broadcast interval (ms).
pub const HEARTBEAT_INTERVAL_MS: u64 = 3000;

/// Peer table sweep interval (ms).
pub const PEER_SWEEP_INTERVAL_MS: u64 = 5000;

/// Public room advertisement interval (ms).
pub const ROOM_ADVERT_INTERVAL_MS: u64 = 5000;

/// Discovery-layer peer expiry (ms).
pub const DISCOVERY_PEER_EXPIRY_MS: u64 = 10_000;

/// Session-layer peer expiry (ms).
pub const SESSION_PEER_EXPIRY_MS: u64 = 30_000;

/// Duplicate message-id rejection window (ms).
pub const MESSAGE_DEDUP_WINDOW_MS: u64 = 60_000;

// --- Transmit Scheduling ---
/// Background transmit queue depth. Overflow drops the oldest non-chat
/// frame first, then the oldest chat frame.
pub const TX_QUEUE_CAP: usize = 8;
/// Capture peak amplitude above which the band is considered occupied
/// and a background send defers one tick.
pub const SENSE_THRESHOLD: f32 = 0.02;
