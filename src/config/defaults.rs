//! Default values for configuration fields.
//!
//! These functions are used by serde for default deserialization.

// ============================================================================
// Common Defaults
// ============================================================================

pub fn r#true() -> bool {
    true
}

pub fn r#false() -> bool {
    false
}

// ============================================================================
// [build] Section Defaults
// ============================================================================

pub mod build {
    use std::path::PathBuf;

    pub fn root() -> Option<PathBuf> {
        None
    }

    pub fn pages() -> PathBuf {
        ".".into()
    }

    pub fn output() -> PathBuf {
        "_site".into()
    }

    pub fn assets() -> PathBuf {
        "_assets".into()
    }

    pub fn template() -> PathBuf {
        "_template.html".into()
    }

    pub fn mode() -> String {
        "production".into()
    }

    pub fn date_format() -> String {
        "%Y-%m-%d".into()
    }
}

// ============================================================================
// [islands] Section Defaults
// ============================================================================

pub mod islands {
    use std::path::PathBuf;

    pub fn cdn_url() -> String {
        "https://esm.sh".into()
    }

    pub fn cache_dir() -> PathBuf {
        std::env::temp_dir().join(".atoll").join("remote-modules")
    }

    pub fn memory_limit() -> String {
        "256MB".into()
    }
}

// ============================================================================
// [serve] Section Defaults
// ============================================================================

pub mod serve {
    pub fn interface() -> String {
        "127.0.0.1".into()
    }

    pub fn port() -> u16 {
        5277
    }

    pub fn debounce_ms() -> u64 {
        300
    }
}
