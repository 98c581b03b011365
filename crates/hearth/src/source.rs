/// Philips Hue lighting bridge.
pub const HUE: &str = "hue";
/// Netatmo weather station.
pub const NETATMO: &str = "netatmo";
/// Dyson air purifiers reached through their local `MQTT` broker.
pub const DYSON: &str = "dyson";
/// Sonos speakers.
pub const SONOS: &str = "sonos";
/// Enedis electricity meter.
pub const ENEDIS: &str = "enedis";

/// All well-known device families.
pub const ALL_SOURCES: &[&str] = &[HUE, NETATMO, DYSON, SONOS, ENEDIS];
