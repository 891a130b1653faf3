//! Apply YAML overrides on top of the environment configuration.

use std::path::PathBuf;

use super::env::load_from_env;
use super::yaml::YamlConfig;
use super::{ServerConfig, TlsConfig};

/// Environment (with defaults) first, then every value present in the YAML file.
pub(super) fn merge_config(
    yaml: Option<YamlConfig>,
) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let mut config = load_from_env()?;
    let Some(yaml) = yaml else {
        return Ok(config);
    };

    if let Some(server) = yaml.server {
        if let Some(host) = server.host {
            config.host = host;
        }
        if let Some(port) = server.port {
            config.port = port;
        }
        if let Some(public_hostname) = server.public_hostname {
            config.public_hostname = Some(public_hostname);
        }
        if let Some(tls) = server.tls {
            match tls.enabled {
                Some(false) => config.tls = None,
                Some(true) => {
                    let cert_path = tls
                        .cert_path
                        .or_else(|| config.tls.as_ref().map(|t| t.cert_path.display().to_string()))
                        .ok_or("server.tls.cert_path is required when TLS is enabled")?;
                    let key_path = tls
                        .key_path
                        .or_else(|| config.tls.as_ref().map(|t| t.key_path.display().to_string()))
                        .ok_or("server.tls.key_path is required when TLS is enabled")?;
                    config.tls = Some(TlsConfig {
                        cert_path: PathBuf::from(cert_path),
                        key_path: PathBuf::from(key_path),
                    });
                }
                None => {}
            }
        }
    }

    if let Some(openai) = yaml.openai {
        if let Some(api_key) = openai.api_key {
            config.openai_api_key = Some(api_key);
        }
        let realtime = &mut config.realtime;
        if let Some(model) = openai.model {
            realtime.model = model;
        }
        if let Some(endpoint) = openai.endpoint {
            realtime.endpoint = Some(endpoint);
        }
        if let Some(voice) = openai.voice {
            realtime.voice = voice;
        }
        if let Some(temperature) = openai.temperature {
            realtime.temperature = temperature;
        }
        if let Some(instructions) = openai.instructions {
            realtime.instructions = instructions;
        }
        if let Some(audio_format) = openai.audio_format {
            realtime.audio_format = audio_format;
        }
        if let Some(model) = openai.input_transcription_model {
            realtime.input_transcription_model = Some(model);
        }
    }

    if let Some(bridge) = yaml.bridge {
        if let Some(defer) = bridge.defer_session_config {
            config.bridge.defer_session_config = defer;
        }
        if let Some(timeout) = bridge.close_timeout_ms {
            config.bridge.close_timeout_ms = timeout;
        }
    }

    Ok(config)
}
