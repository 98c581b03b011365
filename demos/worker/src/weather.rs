use std::future::ready;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use hearth_worker::{Error, ProviderBinding, Reply};

use serde::Serialize;

#[derive(Serialize)]
struct Station<'a> {
    name: &'a str,
    temperature: f64,
    humidity: u8,
}

/// A simulated weather station, which only pushes snapshots.
pub(crate) fn provider() -> ProviderBinding {
    let cycles = Arc::new(AtomicU64::new(0));

    ProviderBinding::new().snapshot(move || {
        let cycle = cycles.fetch_add(1, Ordering::Relaxed);
        // A slow oscillation between 18 and 22 degrees.
        let temperature = 18.0 + ((cycle % 8) as f64 - 4.0).abs();
        let stations = [
            Station {
                name: "Indoor",
                temperature,
                humidity: 45,
            },
            Station {
                name: "Outdoor",
                temperature: temperature - 9.5,
                humidity: 80,
            },
        ];
        let snapshot = serde_json::to_string(&stations)
            .map(|devices| Reply::new("devices", devices))
            .map_err(|e| Error::handler(e.to_string()));

        ready(vec![snapshot])
    })
}
