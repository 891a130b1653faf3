//! OpenAI Realtime API configuration types.
//!
//! Model, voice and audio format selection for the realtime connection. Phone
//! calls are bridged with `g711_ulaw`, which is what the telephony side sends.

use serde::{Deserialize, Serialize};

/// OpenAI Realtime API WebSocket endpoint.
pub const OPENAI_REALTIME_URL: &str = "wss://api.openai.com/v1/realtime";

/// Value of the `OpenAI-Beta` handshake header.
pub const OPENAI_BETA_HEADER: &str = "realtime=v1";

// =============================================================================
// Models
// =============================================================================

/// Supported OpenAI Realtime models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OpenAIRealtimeModel {
    /// GPT-4o Realtime Preview 2024-10-01
    #[default]
    #[serde(rename = "gpt-4o-realtime-preview-2024-10-01")]
    Gpt4oRealtimePreview20241001,
    /// GPT-4o Realtime Preview (floating alias)
    #[serde(rename = "gpt-4o-realtime-preview")]
    Gpt4oRealtimePreview,
    /// GPT-4o Realtime Preview 2024-12-17
    #[serde(rename = "gpt-4o-realtime-preview-2024-12-17")]
    Gpt4oRealtimePreview20241217,
    /// GPT-4o Mini Realtime Preview
    #[serde(rename = "gpt-4o-mini-realtime-preview")]
    Gpt4oMiniRealtimePreview,
}

impl OpenAIRealtimeModel {
    const ALL: [Self; 4] = [
        Self::Gpt4oRealtimePreview20241001,
        Self::Gpt4oRealtimePreview,
        Self::Gpt4oRealtimePreview20241217,
        Self::Gpt4oMiniRealtimePreview,
    ];

    /// Convert to the API parameter value.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gpt4oRealtimePreview20241001 => "gpt-4o-realtime-preview-2024-10-01",
            Self::Gpt4oRealtimePreview => "gpt-4o-realtime-preview",
            Self::Gpt4oRealtimePreview20241217 => "gpt-4o-realtime-preview-2024-12-17",
            Self::Gpt4oMiniRealtimePreview => "gpt-4o-mini-realtime-preview",
        }
    }

    /// Parse a model name, returning `None` for unknown values.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_lowercase();
        Self::ALL.into_iter().find(|m| m.as_str() == s)
    }
}

impl std::fmt::Display for OpenAIRealtimeModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Voices
// =============================================================================

/// Available voices for the OpenAI Realtime API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpenAIRealtimeVoice {
    #[default]
    Alloy,
    Ash,
    Ballad,
    Coral,
    Echo,
    Sage,
    Shimmer,
    Verse,
}

impl OpenAIRealtimeVoice {
    /// Get all available voices.
    pub fn all() -> &'static [OpenAIRealtimeVoice] {
        &[
            Self::Alloy,
            Self::Ash,
            Self::Ballad,
            Self::Coral,
            Self::Echo,
            Self::Sage,
            Self::Shimmer,
            Self::Verse,
        ]
    }

    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alloy => "alloy",
            Self::Ash => "ash",
            Self::Ballad => "ballad",
            Self::Coral => "coral",
            Self::Echo => "echo",
            Self::Sage => "sage",
            Self::Shimmer => "shimmer",
            Self::Verse => "verse",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_lowercase();
        Self::all().iter().copied().find(|v| v.as_str() == s)
    }
}

impl std::fmt::Display for OpenAIRealtimeVoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Audio Formats
// =============================================================================

/// Audio encodings accepted by the realtime session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OpenAIRealtimeAudioFormat {
    /// G.711 u-law, 8kHz (telephony default)
    #[default]
    #[serde(rename = "g711_ulaw")]
    G711Ulaw,
    /// G.711 a-law, 8kHz
    #[serde(rename = "g711_alaw")]
    G711Alaw,
    /// PCM 16-bit little-endian, 24kHz
    #[serde(rename = "pcm16")]
    Pcm16,
}

impl OpenAIRealtimeAudioFormat {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::G711Ulaw => "g711_ulaw",
            Self::G711Alaw => "g711_alaw",
            Self::Pcm16 => "pcm16",
        }
    }

    pub fn sample_rate(&self) -> u32 {
        match self {
            Self::G711Ulaw | Self::G711Alaw => 8000,
            Self::Pcm16 => 24000,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "g711_ulaw" | "ulaw" | "mulaw" => Some(Self::G711Ulaw),
            "g711_alaw" | "alaw" => Some(Self::G711Alaw),
            "pcm16" | "pcm" => Some(Self::Pcm16),
            _ => None,
        }
    }
}

impl std::fmt::Display for OpenAIRealtimeAudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_parsing() {
        assert_eq!(
            OpenAIRealtimeModel::parse("gpt-4o-realtime-preview-2024-10-01"),
            Some(OpenAIRealtimeModel::Gpt4oRealtimePreview20241001)
        );
        assert_eq!(
            OpenAIRealtimeModel::parse("GPT-4O-MINI-REALTIME-PREVIEW"),
            Some(OpenAIRealtimeModel::Gpt4oMiniRealtimePreview)
        );
        assert_eq!(OpenAIRealtimeModel::parse("gpt-3"), None);
        assert_eq!(
            OpenAIRealtimeModel::default().as_str(),
            "gpt-4o-realtime-preview-2024-10-01"
        );
    }

    #[test]
    fn test_voice_parsing() {
        assert_eq!(
            OpenAIRealtimeVoice::parse("SHIMMER"),
            Some(OpenAIRealtimeVoice::Shimmer)
        );
        assert_eq!(OpenAIRealtimeVoice::parse("nobody"), None);
        assert_eq!(OpenAIRealtimeVoice::all().len(), 8);
    }

    #[test]
    fn test_audio_format() {
        assert_eq!(OpenAIRealtimeAudioFormat::default().as_str(), "g711_ulaw");
        assert_eq!(OpenAIRealtimeAudioFormat::G711Ulaw.sample_rate(), 8000);
        assert_eq!(OpenAIRealtimeAudioFormat::Pcm16.sample_rate(), 24000);
        assert_eq!(
            OpenAIRealtimeAudioFormat::parse("mulaw"),
            Some(OpenAIRealtimeAudioFormat::G711Ulaw)
        );
        assert_eq!(OpenAIRealtimeAudioFormat::parse("opus"), None);
    }

    #[test]
    fn test_realtime_url() {
        assert_eq!(OPENAI_REALTIME_URL, "wss://api.openai.com/v1/realtime");
    }
}
