use std::path::PathBuf;
use std::sync::RwLock;
use anyhow::Context;
use tracing::info;

pub const MESSAGE_KEY: &str = "MESSAGE";

/// A config value that can be re-read from the env file while the service
/// keeps running.
pub struct RefreshableMessage {
    value: RwLock<String>,
    env_file: Option<PathBuf>,
}

impl RefreshableMessage {
    pub fn new(initial: impl Into<String>, env_file: Option<PathBuf>) -> Self {
        Self {
            value: RwLock::new(initial.into()),
            env_file,
        }
    }

    pub fn current(&self) -> String {
        self.value
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Reloads `MESSAGE` from the env file. Returns whether the value changed;
    /// a file without the key leaves the current value in place.
    pub fn refresh(&self) -> anyhow::Result<bool> {
        let entries = match &self.env_file {
            Some(path) => dotenv::from_path_iter(path)
                .with_context(|| format!("Failed to open env file: {}", path.display()))?,
            None => dotenv::dotenv_iter().context("Failed to locate a .env file")?,
        };

        let mut reloaded = None;
        for entry in entries {
            let (key, value) = entry.context("Failed to parse env file")?;
            if key == MESSAGE_KEY {
                reloaded = Some(value);
            }
        }

        let Some(reloaded) = reloaded else {
            return Ok(false);
        };

        let mut value = self.value.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        if *value == reloaded {
            return Ok(false);
        }
        info!("Refreshed message from {:?} to {:?}", *value, reloaded);
        *value = reloaded;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};
    use super::*;

    fn env_file_with(contents: &str) -> PathBuf {
        let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
        let path = std::env::temp_dir().join(format!("reservations-{}-{}.env", std::process::id(), nanos));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn refresh_picks_up_changed_value() {
        let path = env_file_with("MESSAGE=Hello world\n");
        let message = RefreshableMessage::new("Hello", Some(path.clone()));

        assert!(message.refresh().unwrap());
        assert_eq!(message.current(), "Hello world");
        assert!(!message.refresh().unwrap());

        std::fs::write(&path, "OTHER=1\nMESSAGE=\"Bonjour\"\n").unwrap();
        assert!(message.refresh().unwrap());
        assert_eq!(message.current(), "Bonjour");
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn refresh_without_key_keeps_value() {
        let path = env_file_with("OTHER=1\n");
        let message = RefreshableMessage::new("Hello", Some(path.clone()));

        assert!(!message.refresh().unwrap());
        assert_eq!(message.current(), "Hello");
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn missing_env_file_is_an_error() {
        let message = RefreshableMessage::new("Hello", Some(PathBuf::from("/nonexistent/reservations.env")));
        assert!(message.refresh().is_err());
        assert_eq!(message.current(), "Hello");
    }
}
