//! Ordered multi-provider speech synthesis with audio asset storage.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use curio_core::persona::VoiceArchetype;
use uuid::Uuid;

use crate::config::TtsOrder;
use crate::providers::{ProviderError, SpeechProvider};
use crate::store::SharedStore;

pub mod wav {
    /// Wrap raw little-endian PCM samples in a minimal 44-byte RIFF/WAVE header.
    pub fn wrap_pcm(pcm: &[u8], sample_rate: u32, channels: u16, bits_per_sample: u16) -> Vec<u8> {
        let block_align = channels * bits_per_sample / 8;
        let byte_rate = sample_rate * u32::from(block_align);
        let data_len = pcm.len() as u32;

        let mut out = Vec::with_capacity(44 + pcm.len());
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes()); // PCM
        out.extend_from_slice(&channels.to_le_bytes());
        out.extend_from_slice(&sample_rate.to_le_bytes());
        out.extend_from_slice(&byte_rate.to_le_bytes());
        out.extend_from_slice(&block_align.to_le_bytes());
        out.extend_from_slice(&bits_per_sample.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        out.extend_from_slice(pcm);
        out
    }

}

/// Lookup record for a stored audio file.
#[derive(Debug, Clone)]
pub struct AudioAsset {
    pub audio_id: String,
    pub content_type: String,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedAsset {
    pub audio_id: String,
    pub stream_url: String,
}

pub fn stream_url(audio_id: &str) -> String {
    format!("/v1/audio/{audio_id}")
}

fn extension_for(content_type: &str) -> &'static str {
    let lowered = content_type.to_ascii_lowercase();
    if lowered.contains("wav") {
        "wav"
    } else if lowered.contains("mpeg") || lowered.contains("mp3") {
        "mp3"
    } else if lowered.contains("ogg") {
        "ogg"
    } else {
        "bin"
    }
}

/// Arrange speech providers per the configured order. `Auto` prefers
/// ElevenLabs when it is enabled.
pub fn order_providers(
    order: TtsOrder,
    gemini: Arc<dyn SpeechProvider>,
    elevenlabs: Arc<dyn SpeechProvider>,
) -> Vec<Arc<dyn SpeechProvider>> {
    let elevenlabs_first = match order {
        TtsOrder::GeminiFirst => false,
        TtsOrder::ElevenLabsFirst => true,
        TtsOrder::Auto => elevenlabs.is_enabled(),
    };
    if elevenlabs_first {
        vec![elevenlabs, gemini]
    } else {
        vec![gemini, elevenlabs]
    }
}

pub struct VoiceSynthesizer {
    providers: Vec<Arc<dyn SpeechProvider>>,
    timeout: Duration,
    audio_dir: PathBuf,
    assets: SharedStore<AudioAsset>,
}

impl VoiceSynthesizer {
    pub fn new(
        providers: Vec<Arc<dyn SpeechProvider>>,
        timeout: Duration,
        audio_dir: PathBuf,
        assets: SharedStore<AudioAsset>,
    ) -> Self {
        Self {
            providers,
            timeout,
            audio_dir,
            assets,
        }
    }

    /// Try each enabled provider in order. `None` means "no audio"; the
    /// caller still delivers text.
    pub async fn synthesize_to_asset(
        &self,
        text: &str,
        archetype: VoiceArchetype,
    ) -> Option<SynthesizedAsset> {
        if text.trim().is_empty() {
            return None;
        }
        for provider in self.providers.iter().filter(|provider| provider.is_enabled()) {
            let outcome = match tokio::time::timeout(self.timeout, provider.synthesize(text, archetype)).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout(self.timeout)),
            };
            let clip = match outcome {
                Ok(clip) if !clip.bytes.is_empty() => clip,
                Ok(_) => {
                    tracing::warn!(provider = provider.name(), "speech provider returned empty audio");
                    continue;
                }
                Err(err) => {
                    tracing::warn!(provider = provider.name(), error = %err, "speech synthesis failed");
                    continue;
                }
            };

            match self.store_clip(&clip.bytes, &clip.content_type).await {
                Ok(asset) => {
                    tracing::info!(
                        provider = provider.name(),
                        audio_id = %asset.audio_id,
                        bytes = clip.bytes.len(),
                        "speech synthesized"
                    );
                    return Some(asset);
                }
                Err(err) => {
                    tracing::error!(error = %err, "failed to store synthesized audio");
                    return None;
                }
            }
        }
        tracing::info!("no speech provider produced audio");
        None
    }

    async fn store_clip(&self, bytes: &[u8], content_type: &str) -> std::io::Result<SynthesizedAsset> {
        tokio::fs::create_dir_all(&self.audio_dir).await?;
        let audio_id = Uuid::now_v7().to_string();
        let path = self
            .audio_dir
            .join(format!("{audio_id}.{}", extension_for(content_type)));
        tokio::fs::write(&path, bytes).await?;

        self.assets.put(
            &audio_id,
            AudioAsset {
                audio_id: audio_id.clone(),
                content_type: content_type.to_string(),
                path,
                created_at: Utc::now(),
            },
        );
        Ok(SynthesizedAsset {
            stream_url: stream_url(&audio_id),
            audio_id,
        })
    }

    pub fn asset(&self, audio_id: &str) -> Option<AudioAsset> {
        self.assets.get(audio_id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::providers::SpeechClip;
    use crate::store::{KeyValueStore, MemoryStore};

    struct FakeSpeech {
        name: &'static str,
        enabled: bool,
        reply: Option<&'static [u8]>,
        calls: AtomicUsize,
    }

    impl FakeSpeech {
        fn new(name: &'static str, reply: Option<&'static [u8]>) -> Arc<Self> {
            Arc::new(Self {
                name,
                enabled: true,
                reply,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl SpeechProvider for FakeSpeech {
        fn name(&self) -> &str {
            self.name
        }

        fn is_enabled(&self) -> bool {
            self.enabled
        }

        async fn synthesize(
            &self,
            _text: &str,
            _archetype: VoiceArchetype,
        ) -> Result<SpeechClip, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.reply {
                Some(bytes) => Ok(SpeechClip {
                    bytes: bytes.to_vec(),
                    content_type: "audio/mpeg".to_string(),
                }),
                None => Err(ProviderError::InvalidPayload("fake failure".to_string())),
            }
        }
    }

    fn synthesizer(
        providers: Vec<Arc<dyn SpeechProvider>>,
        dir: &tempfile::TempDir,
    ) -> (VoiceSynthesizer, Arc<MemoryStore<AudioAsset>>) {
        let assets = Arc::new(MemoryStore::new());
        (
            VoiceSynthesizer::new(
                providers,
                Duration::from_secs(1),
                dir.path().join("audio"),
                assets.clone(),
            ),
            assets,
        )
    }

    #[tokio::test]
    async fn second_provider_is_tried_after_first_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let failing = FakeSpeech::new("first", None);
        let working = FakeSpeech::new("second", Some(b"mp3-bytes"));
        let (voice, assets) = synthesizer(vec![failing.clone() as Arc<dyn SpeechProvider>, working.clone()], &dir);

        let asset = voice
            .synthesize_to_asset("hello", VoiceArchetype::Playful)
            .await
            .expect("second provider should succeed");
        assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
        assert_eq!(working.calls.load(Ordering::SeqCst), 1);
        assert_eq!(asset.stream_url, format!("/v1/audio/{}", asset.audio_id));

        let stored = assets.get(&asset.audio_id).expect("asset registered");
        assert_eq!(stored.content_type, "audio/mpeg");
        assert_eq!(std::fs::read(&stored.path).expect("file written"), b"mp3-bytes");
    }

    #[tokio::test]
    async fn all_providers_failing_returns_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let first = FakeSpeech::new("first", None);
        let second = FakeSpeech::new("second", None);
        let (voice, assets) = synthesizer(vec![first.clone() as Arc<dyn SpeechProvider>, second.clone()], &dir);

        assert!(voice.synthesize_to_asset("hello", VoiceArchetype::Wise).await.is_none());
        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.calls.load(Ordering::SeqCst), 1);
        assert!(assets.values().is_empty());
    }

    #[tokio::test]
    async fn disabled_providers_are_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let disabled = Arc::new(FakeSpeech {
            name: "off",
            enabled: false,
            reply: Some(b"x"),
            calls: AtomicUsize::new(0),
        });
        let (voice, _) = synthesizer(vec![disabled.clone() as Arc<dyn SpeechProvider>], &dir);
        assert!(voice.synthesize_to_asset("hello", VoiceArchetype::Wise).await.is_none());
        assert_eq!(disabled.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn auto_order_prefers_enabled_elevenlabs() {
        let gemini = FakeSpeech::new("gemini", None);
        let eleven = FakeSpeech::new("elevenlabs", None);
        let ordered = order_providers(TtsOrder::Auto, gemini.clone(), eleven.clone());
        assert_eq!(ordered[0].name(), "elevenlabs");
        let ordered = order_providers(TtsOrder::GeminiFirst, gemini, eleven);
        assert_eq!(ordered[0].name(), "gemini");
    }
}
