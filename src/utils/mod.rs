pub mod consts;
pub mod logging;
pub mod settings;

/// Milliseconds since the Unix epoch; datagram timestamps use this scale.
pub fn epoch_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
