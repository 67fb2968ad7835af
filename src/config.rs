use std::net::SocketAddr;
use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "DoseTrack";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the application data directory
/// ~/DoseTrack/ on all platforms (user-visible)
pub fn app_data_dir() -> PathBuf {
    match dirs::home_dir() {
        Some(home) => home.join("DoseTrack"),
        None => PathBuf::from("."),
    }
}

/// Database file path: `$DOSETRACK_DB` or `~/DoseTrack/dosetrack.db`.
pub fn database_path() -> PathBuf {
    match std::env::var_os("DOSETRACK_DB") {
        Some(path) => PathBuf::from(path),
        None => app_data_dir().join("dosetrack.db"),
    }
}

/// Listen address: `$DOSETRACK_ADDR` or 127.0.0.1:8080.
pub fn bind_addr() -> SocketAddr {
    std::env::var("DOSETRACK_ADDR")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8080)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_data_dir_under_home() {
        let dir = app_data_dir();
        if let Some(home) = dirs::home_dir() {
            assert!(dir.starts_with(home));
            assert!(dir.ends_with("DoseTrack"));
        }
    }

    #[test]
    fn database_path_defaults_under_app_dir() {
        if std::env::var_os("DOSETRACK_DB").is_none() {
            assert!(database_path().ends_with("dosetrack.db"));
        }
    }

    #[test]
    fn bind_addr_has_default() {
        // Parsing falls back rather than panicking.
        let addr = bind_addr();
        assert!(addr.port() > 0);
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.3.0");
    }
}
