use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::{
    HeapProd, HeapRb,
    traits::{Producer, Split},
};
use tracing::{debug, error, info, warn};

use super::{AudioBackend, Patch, PoolRenderer, VoicePool, Voices};
use crate::events::VoiceCommand;
use crate::timing::SharedTransport;
use crate::{Error, Result};

const COMMAND_QUEUE: usize = 1024;

/// Plays voice pools on the default cpal output device.
#[derive(Debug, Clone, Default)]
pub struct CpalBackend {
    patch: Patch,
}

impl CpalBackend {
    pub fn new(patch: Patch) -> Self {
        Self { patch }
    }
}

impl AudioBackend for CpalBackend {
    fn create_voice_pool(&self, transport: SharedTransport) -> Result<Box<dyn VoicePool>> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device".into()))?;
        let default = device
            .default_output_config()
            .map_err(|e| Error::Audio(format!("failed to get default output config: {}", e)))?;
        let supported = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(format!("failed to list output configs: {}", e)))?;

        let default_format = default.sample_format();
        let config = choose_f32_config(default, supported).ok_or_else(|| {
            Error::Audio(format!(
                "no f32 output config (default format {:?})",
                default_format
            ))
        })?;

        let sample_rate = config.sample_rate().0 as f32;
        let stream_config: cpal::StreamConfig = config.into();
        let channels = stream_config.channels as usize;

        let (commands, consumer) = HeapRb::<VoiceCommand>::new(COMMAND_QUEUE).split();
        let mut renderer = PoolRenderer::new(
            Voices::new(self.patch.clone(), sample_rate),
            transport,
            consumer,
            channels,
        );

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| renderer.render(data),
                |err| error!("Audio stream error: {}", err),
                None,
            )
            .map_err(|e| Error::Audio(format!("failed to build output stream: {}", e)))?;

        stream
            .play()
            .map_err(|e| Error::Audio(format!("failed to start output stream: {}", e)))?;

        info!(channels, sample_rate, "voice pool created");
        Ok(Box::new(CpalVoicePool { stream, commands }))
    }
}

/// The device default if it is already f32, else the f32 range closest to it:
/// same channel count first, then the default sample rate if the range covers it.
fn choose_f32_config(
    default: cpal::SupportedStreamConfig,
    supported: impl IntoIterator<Item = cpal::SupportedStreamConfigRange>,
) -> Option<cpal::SupportedStreamConfig> {
    if default.sample_format() == cpal::SampleFormat::F32 {
        return Some(default);
    }

    let rate = default.sample_rate();
    let mut ranges: Vec<_> = supported
        .into_iter()
        .filter(|r| r.sample_format() == cpal::SampleFormat::F32)
        .collect();
    ranges.sort_by_key(|r| {
        (
            r.channels() != default.channels(),
            !(r.min_sample_rate() <= rate && rate <= r.max_sample_rate()),
        )
    });

    let range = ranges.into_iter().next()?;
    let config = if range.min_sample_rate() <= rate && rate <= range.max_sample_rate() {
        range.with_sample_rate(rate)
    } else {
        range.with_max_sample_rate()
    };
    debug!(
        default_format = ?default.sample_format(),
        ?config,
        "falling back to f32 output config"
    );
    Some(config)
}

pub struct CpalVoicePool {
    stream: cpal::Stream,
    commands: HeapProd<VoiceCommand>,
}

impl CpalVoicePool {
    fn send(&mut self, command: VoiceCommand) {
        if self.commands.try_push(command).is_err() {
            warn!(?command, "voice command queue full, dropping");
        }
    }
}

impl VoicePool for CpalVoicePool {
    fn trigger(&mut self, pitch: u8, velocity: f32, when: f64, duration: f64) {
        self.send(VoiceCommand::Trigger {
            pitch,
            velocity,
            when,
            duration,
        });
    }

    fn release_all(&mut self) {
        self.send(VoiceCommand::ReleaseAll);
    }

    fn dispose(self: Box<Self>) {
        if let Err(e) = self.stream.pause() {
            debug!("failed to pause output stream on dispose: {}", e);
        }
        drop(self);
        info!("voice pool disposed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpal::{
        SampleFormat, SampleRate, SupportedBufferSize, SupportedStreamConfig,
        SupportedStreamConfigRange,
    };

    fn default_config(format: SampleFormat) -> SupportedStreamConfig {
        SupportedStreamConfig::new(2, SampleRate(48_000), SupportedBufferSize::Unknown, format)
    }

    fn range(
        channels: u16,
        min: u32,
        max: u32,
        format: SampleFormat,
    ) -> SupportedStreamConfigRange {
        SupportedStreamConfigRange::new(
            channels,
            SampleRate(min),
            SampleRate(max),
            SupportedBufferSize::Unknown,
            format,
        )
    }

    #[test]
    fn f32_default_is_used_as_is() {
        let config = choose_f32_config(default_config(SampleFormat::F32), Vec::new()).unwrap();
        assert_eq!(config.sample_format(), SampleFormat::F32);
        assert_eq!(config.sample_rate(), SampleRate(48_000));
    }

    #[test]
    fn i16_default_falls_back_to_matching_f32_range() {
        let supported = vec![
            range(2, 8_000, 192_000, SampleFormat::I16),
            range(1, 8_000, 192_000, SampleFormat::F32),
            range(2, 8_000, 192_000, SampleFormat::F32),
        ];
        let config = choose_f32_config(default_config(SampleFormat::I16), supported).unwrap();

        assert_eq!(config.sample_format(), SampleFormat::F32);
        assert_eq!(config.channels(), 2);
        assert_eq!(config.sample_rate(), SampleRate(48_000));
    }

    #[test]
    fn uncovered_rate_takes_range_maximum() {
        let supported = vec![range(2, 22_050, 44_100, SampleFormat::F32)];
        let config = choose_f32_config(default_config(SampleFormat::I16), supported).unwrap();
        assert_eq!(config.sample_rate(), SampleRate(44_100));
    }

    #[test]
    fn no_f32_range_is_none() {
        let supported = vec![range(2, 8_000, 192_000, SampleFormat::I16)];
        assert!(choose_f32_config(default_config(SampleFormat::I16), supported).is_none());
    }
}
