use serde::Deserialize;
use std::path::PathBuf;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present in
/// the file override environment variables.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 3000
///   public_hostname: "bridge.example.com"
///   tls:
///     enabled: true
///     cert_path: "/etc/bridge/cert.pem"
///     key_path: "/etc/bridge/key.pem"
///
/// openai:
///   api_key: "sk-..."
///   model: "gpt-4o-realtime-preview-2024-10-01"
///   voice: "alloy"
///   temperature: 0.8
///   instructions: "You are a friendly receptionist."
///
/// bridge:
///   defer_session_config: true
///   close_timeout_ms: 3000
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub openai: Option<OpenAIYaml>,
    pub bridge: Option<BridgeYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Host name Twilio uses to reach the media stream endpoint
    pub public_hostname: Option<String>,
    pub tls: Option<TlsYaml>,
}

/// TLS configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TlsYaml {
    pub enabled: Option<bool>,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

/// OpenAI Realtime settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct OpenAIYaml {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub endpoint: Option<String>,
    pub voice: Option<String>,
    pub temperature: Option<f32>,
    pub instructions: Option<String>,
    pub audio_format: Option<String>,
    /// Transcription model for caller speech (e.g. "whisper-1")
    pub input_transcription_model: Option<String>,
}

/// Call bridge behavior from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct BridgeYaml {
    pub defer_session_config: Option<bool>,
    pub close_timeout_ms: Option<u64>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or the YAML is malformed.
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_yaml_config_full() {
        let yaml = r#"
server:
  host: "127.0.0.1"
  port: 8080
  public_hostname: "abc.ngrok.app"
  tls:
    enabled: true
    cert_path: "/tmp/cert.pem"
    key_path: "/tmp/key.pem"

openai:
  api_key: "sk-yaml"
  voice: "shimmer"
  temperature: 0.7

bridge:
  defer_session_config: false
  close_timeout_ms: 500
"#;

        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();
        let server = config.server.unwrap();
        assert_eq!(server.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(server.port, Some(8080));
        assert_eq!(server.public_hostname.as_deref(), Some("abc.ngrok.app"));
        assert_eq!(server.tls.unwrap().enabled, Some(true));

        let openai = config.openai.unwrap();
        assert_eq!(openai.api_key.as_deref(), Some("sk-yaml"));
        assert_eq!(openai.voice.as_deref(), Some("shimmer"));
        assert_eq!(openai.temperature, Some(0.7));
        assert!(openai.model.is_none());

        let bridge = config.bridge.unwrap();
        assert_eq!(bridge.defer_session_config, Some(false));
        assert_eq!(bridge.close_timeout_ms, Some(500));
    }

    #[test]
    fn test_yaml_config_empty() {
        let config: YamlConfig = serde_yaml::from_str("{}").unwrap();
        assert!(config.server.is_none());
        assert!(config.openai.is_none());
        assert!(config.bridge.is_none());
    }

    #[test]
    fn test_yaml_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");
        fs::write(&path, "server:\n  port: 4000\n").unwrap();

        let config = YamlConfig::from_file(&path).unwrap();
        assert_eq!(config.server.unwrap().port, Some(4000));
    }

    #[test]
    fn test_yaml_from_file_missing() {
        let result = YamlConfig::from_file(&PathBuf::from("/nonexistent/bridge.yaml"));
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to read config file")
        );
    }
}
