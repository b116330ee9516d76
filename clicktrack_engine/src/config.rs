use clicktrack_shared::MetronomeConfig;
use std::fs::File;
use std::io::Write;
use std::path::Path;

pub fn load_config(path: &Path) -> Result<MetronomeConfig, anyhow::Error> {
    let content = std::fs::read_to_string(path)?;
    let config: MetronomeConfig = serde_json::from_str(&content)?;
    log::info!("[Config] Loaded {}", path.display());
    Ok(config)
}

pub fn save_config(config: &MetronomeConfig, path: &Path) -> Result<(), anyhow::Error> {
    let json = serde_json::to_string_pretty(config)?;
    let mut file = File::create(path)?;
    file.write_all(json.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metronome.json");
        let config = MetronomeConfig {
            volume: 0.4,
            tracker_interval_ms: 5,
            device_buffer_frames: Some(512),
            ..MetronomeConfig::default()
        };
        save_config(&config, &path).unwrap();
        assert_eq!(load_config(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(&dir.path().join("nope.json")).is_err());
    }
}
