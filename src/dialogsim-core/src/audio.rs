//! Audio assembly: one synthesized clip per utterance, merged into a single
//! conversation track.

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use kokoro_tiny::TtsEngine;
use log::{info, warn};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Settings;
use crate::error::DialogueError;
use crate::participant::Role;

pub const MERGED_TRACK: &str = "conversation.wav";
const CLIP_DIR: &str = "audio";

/// Capability: turn text into mono `f32` samples.
pub trait SpeechSynthesizer {
    /// Provider identifier, as used in settings.
    fn provider(&self) -> &str;

    fn sample_rate(&self) -> u32;

    fn synthesize(&mut self, text: &str, voice: &str) -> Result<Vec<f32>, DialogueError>;
}

/// Pick the synthesizer for a `tts_provider` setting.
pub async fn synthesizer_for_provider(
    provider: &str,
) -> Result<Box<dyn SpeechSynthesizer>, DialogueError> {
    match provider.to_lowercase().as_str() {
        "kokoro" | "kokoro-tiny" => Ok(Box::new(KokoroSynthesizer::new().await?)),
        other => Err(DialogueError::ConfigError(format!(
            "Unknown TTS provider: '{}'. Available providers: kokoro",
            other
        ))),
    }
}

/// Local synthesis with kokoro-tiny.
pub struct KokoroSynthesizer {
    engine: TtsEngine,
    available_voices: Vec<String>,
}

impl KokoroSynthesizer {
    pub const SAMPLE_RATE: u32 = 24_000;
    /// Kokoro has a strict input limit; ~200 chars is safe.
    const MAX_CHUNK_CHARS: usize = 200;
    /// 0.3 seconds between chunks.
    const CHUNK_PAUSE: usize = 7_200;
    /// 0.5 seconds after the last chunk so the final word is not cut off.
    const TRAILING_PAUSE: usize = 12_000;

    /// Initialize the TTS engine (downloads model on first run).
    pub async fn new() -> Result<Self, DialogueError> {
        let engine = TtsEngine::new()
            .await
            .map_err(|e| DialogueError::TtsError(format!("Failed to initialize TTS: {}", e)))?;

        let available_voices = engine.voices();

        Ok(Self {
            engine,
            available_voices,
        })
    }

    /// Validate that a voice ID exists.
    pub fn validate_voice(&self, voice_id: &str) -> Result<(), DialogueError> {
        if voice_id.is_empty() {
            return Err(DialogueError::TtsError(format!(
                "Voice ID cannot be empty. Available voices:\n{}",
                self.format_available_voices()
            )));
        }

        if !self.available_voices.iter().any(|v| v == voice_id) {
            return Err(DialogueError::TtsError(format!(
                "Unknown voice '{}'. Available voices:\n{}",
                voice_id,
                self.format_available_voices()
            )));
        }

        Ok(())
    }

    /// Format available English voices for display.
    fn format_available_voices(&self) -> String {
        let mut english_voices: Vec<&String> = self
            .available_voices
            .iter()
            .filter(|v| {
                v.starts_with("af_")
                    || v.starts_with("am_")
                    || v.starts_with("bf_")
                    || v.starts_with("bm_")
            })
            .collect();
        english_voices.sort();

        english_voices
            .iter()
            .map(|v| format!("  - {}", v))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Map generic voice names onto Kokoro voice ids; anything else passes through.
pub fn resolve_kokoro_voice(voice: &str) -> &str {
    match voice.to_lowercase().as_str() {
        "male" => "bm_george",
        "female" => "bf_emma",
        _ => voice,
    }
}

impl SpeechSynthesizer for KokoroSynthesizer {
    fn provider(&self) -> &str {
        "kokoro"
    }

    fn sample_rate(&self) -> u32 {
        Self::SAMPLE_RATE
    }

    fn synthesize(&mut self, text: &str, voice: &str) -> Result<Vec<f32>, DialogueError> {
        let voice_id = resolve_kokoro_voice(voice);
        self.validate_voice(voice_id)?;

        let mut all_samples = Vec::new();

        for chunk in split_into_chunks(text, Self::MAX_CHUNK_CHARS) {
            if chunk.trim().is_empty() {
                continue;
            }

            let samples = self
                .engine
                .synthesize(&chunk, Some(voice_id))
                .map_err(|e| DialogueError::TtsError(format!("Synthesis failed: {}", e)))?;

            all_samples.extend(samples);
            all_samples.extend(vec![0.0; Self::CHUNK_PAUSE]);
        }

        all_samples.extend(vec![0.0; Self::TRAILING_PAUSE]);

        Ok(all_samples)
    }
}

/// Split text into chunks that are safe for TTS synthesis.
fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current_chunk = String::new();

    // Split by sentence-ending punctuation
    for sentence in text.split_inclusive(&['.', '!', '?', ';'][..]) {
        let sentence = sentence.trim();
        if sentence.is_empty() {
            continue;
        }

        if current_chunk.len() + sentence.len() > max_chars {
            if !current_chunk.is_empty() {
                chunks.push(current_chunk.trim().to_string());
                current_chunk = String::new();
            }

            // If single sentence is too long, split by commas
            if sentence.len() > max_chars {
                for part in sentence.split_inclusive(',') {
                    if current_chunk.len() + part.len() > max_chars && !current_chunk.is_empty() {
                        chunks.push(current_chunk.trim().to_string());
                        current_chunk = String::new();
                    }
                    current_chunk.push_str(part);
                    current_chunk.push(' ');
                }
            } else {
                current_chunk.push_str(sentence);
                current_chunk.push(' ');
            }
        } else {
            current_chunk.push_str(sentence);
            current_chunk.push(' ');
        }
    }

    if !current_chunk.trim().is_empty() {
        chunks.push(current_chunk.trim().to_string());
    }

    chunks
}

/// Concatenate interleaved segments with silence gaps between them.
///
/// The gap is a whole number of frames so channels stay aligned.
pub fn combine_audio_segments(
    segments: Vec<Vec<f32>>,
    gap_seconds: f32,
    sample_rate: u32,
    channels: u16,
) -> Vec<f32> {
    let gap_frames = (gap_seconds * sample_rate as f32) as usize;
    let gap_samples = gap_frames * usize::from(channels.max(1));
    let silence: Vec<f32> = vec![0.0; gap_samples];

    let mut combined = Vec::new();

    for (i, segment) in segments.into_iter().enumerate() {
        if i > 0 {
            combined.extend(&silence);
        }
        combined.extend(segment);
    }

    combined
}

/// Write mono float samples as a WAV file.
pub fn write_clip<P: AsRef<Path>>(
    path: P,
    samples: &[f32],
    sample_rate: u32,
) -> Result<(), DialogueError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };

    let mut writer = WavWriter::create(path, spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Read a WAV file as `f32` samples, whatever its sample format.
pub fn read_clip<P: AsRef<Path>>(path: P) -> Result<(Vec<f32>, WavSpec), DialogueError> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();

    let samples = match spec.sample_format {
        SampleFormat::Float => reader.samples::<f32>().collect::<Result<Vec<_>, _>>()?,
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    Ok((samples, spec))
}

/// The merged conversation track.
#[derive(Debug, Clone)]
pub struct MergedTrack {
    pub path: PathBuf,
    pub sample_rate: u32,
    pub segments: usize,
    pub samples: usize,
}

/// Concatenate clips in order into `output`.
///
/// Unreadable clips are skipped. The output uses the sample rate and channel
/// count of the last clip read; a mismatch between clips is only logged.
/// Returns `Ok(None)` when there is nothing to merge.
pub fn merge_clips<P: AsRef<Path>>(
    clips: &[PathBuf],
    output: P,
    gap_seconds: f32,
) -> Result<Option<MergedTrack>, DialogueError> {
    let mut segments = Vec::new();
    let mut spec: Option<WavSpec> = None;

    for path in clips {
        let (samples, clip_spec) = match read_clip(path) {
            Ok(clip) => clip,
            Err(e) => {
                warn!("Skipping unreadable clip {}: {}", path.display(), e);
                continue;
            }
        };

        if let Some(previous) = spec {
            if previous.sample_rate != clip_spec.sample_rate {
                warn!(
                    "Clip {} is {} Hz but earlier clips are {} Hz; merged track uses the last rate",
                    path.display(),
                    clip_spec.sample_rate,
                    previous.sample_rate
                );
            }
        }
        spec = Some(clip_spec);
        segments.push(samples);
    }

    let Some(spec) = spec else {
        return Ok(None);
    };

    let segment_count = segments.len();
    let combined = combine_audio_segments(segments, gap_seconds, spec.sample_rate, spec.channels);

    let out_spec = WavSpec {
        channels: spec.channels,
        sample_rate: spec.sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(output.as_ref(), out_spec)?;
    for &sample in &combined {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;

    Ok(Some(MergedTrack {
        path: output.as_ref().to_path_buf(),
        sample_rate: spec.sample_rate,
        segments: segment_count,
        samples: combined.len(),
    }))
}

/// What audio assembly produced.
#[derive(Debug, Clone, Default)]
pub struct AssemblyReport {
    /// Clips written, in transcript order.
    pub clips: Vec<PathBuf>,
    /// 1-based transcript positions whose clip could not be produced.
    pub failed_turns: Vec<usize>,
    /// `None` when no clip succeeded.
    pub merged: Option<MergedTrack>,
}

impl AssemblyReport {
    /// Every line failed; nothing was written.
    pub fn all_failed(line_count: usize) -> Self {
        Self {
            clips: Vec::new(),
            failed_turns: (1..=line_count).collect(),
            merged: None,
        }
    }
}

/// Build the configured synthesizer and render `lines` into `out_dir`.
///
/// A provider that is unknown or fails to start is a soft failure: it is
/// logged and reported as a track with every turn missing.
pub async fn render_transcript(
    settings: &Settings,
    lines: &[String],
    out_dir: impl Into<PathBuf>,
) -> Result<AssemblyReport, DialogueError> {
    let mut synthesizer = match synthesizer_for_provider(&settings.tts_provider).await {
        Ok(synthesizer) => synthesizer,
        Err(e) => {
            warn!("Speech synthesis unavailable, skipping audio: {}", e);
            return Ok(AssemblyReport::all_failed(lines.len()));
        }
    };

    AudioAssembler::new(synthesizer.as_mut(), settings, out_dir).assemble(lines)
}

/// Renders a finished transcript to audio.
pub struct AudioAssembler<'a> {
    synthesizer: &'a mut dyn SpeechSynthesizer,
    voices: [String; 2],
    out_dir: PathBuf,
    gap_seconds: f32,
}

impl<'a> AudioAssembler<'a> {
    pub fn new(
        synthesizer: &'a mut dyn SpeechSynthesizer,
        settings: &Settings,
        out_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            synthesizer,
            voices: [
                settings.voice(Role::AgentA).to_string(),
                settings.voice(Role::AgentB).to_string(),
            ],
            out_dir: out_dir.into(),
            gap_seconds: settings.clip_gap_secs,
        }
    }

    /// Voice for a speaker label: agent A's voice if the label names agent A,
    /// otherwise agent B's.
    pub fn voice_for_label(&self, label: &str) -> &str {
        if label.contains(Role::AgentA.display_name()) {
            &self.voices[Role::AgentA.index()]
        } else {
            &self.voices[Role::AgentB.index()]
        }
    }

    /// Synthesize every `"label: text"` line, then merge the clips.
    ///
    /// Per-clip failures are logged and leave a gap in the track; only
    /// filesystem errors on the output directory are returned as errors.
    pub fn assemble(&mut self, lines: &[String]) -> Result<AssemblyReport, DialogueError> {
        let clip_dir = self.out_dir.join(CLIP_DIR);
        fs::create_dir_all(&clip_dir)?;

        let mut report = AssemblyReport::default();
        let sample_rate = self.synthesizer.sample_rate();

        info!(
            "Generating audio for conversation with provider '{}'",
            self.synthesizer.provider()
        );

        for (idx, line) in lines.iter().enumerate() {
            let Some((label, content)) = line.split_once(':') else {
                warn!("Skipping line {} without a speaker label", idx + 1);
                continue;
            };
            let label = label.trim();
            let content = content.trim();
            let voice = self.voice_for_label(label).to_string();
            let path = clip_dir.join(format!("turn_{}.wav", idx + 1));

            info!("Generating audio for {}: {:.50}", label, content);

            let written = self
                .synthesizer
                .synthesize(content, &voice)
                .and_then(|samples| write_clip(&path, &samples, sample_rate));

            match written {
                Ok(()) => report.clips.push(path),
                Err(e) => {
                    warn!("TTS generation failed for turn {}: {}", idx + 1, e);
                    report.failed_turns.push(idx + 1);
                }
            }
        }

        report.merged = merge_clips(
            &report.clips,
            self.out_dir.join(MERGED_TRACK),
            self.gap_seconds,
        )?;

        match &report.merged {
            Some(track) => info!(
                "Complete conversation audio saved to: {}",
                track.path.display()
            ),
            None => warn!("No audio files were generated successfully"),
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::settings_with_turns;

    /// Emits `len` samples of a per-call marker value; fails on texts
    /// containing "FAIL".
    struct Tone {
        len: usize,
        calls: usize,
        voices: Vec<String>,
    }

    impl Tone {
        fn new(len: usize) -> Self {
            Self {
                len,
                calls: 0,
                voices: Vec::new(),
            }
        }
    }

    impl SpeechSynthesizer for Tone {
        fn provider(&self) -> &str {
            "tone"
        }

        fn sample_rate(&self) -> u32 {
            8_000
        }

        fn synthesize(&mut self, text: &str, voice: &str) -> Result<Vec<f32>, DialogueError> {
            self.calls += 1;
            self.voices.push(voice.to_string());
            if text.contains("FAIL") {
                return Err(DialogueError::TtsError("synthesis refused".to_string()));
            }
            Ok(vec![self.calls as f32 / 10.0; self.len])
        }
    }

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_failed_clip_is_omitted_from_merge() {
        let dir = tempfile::tempdir().unwrap();
        let mut synth = Tone::new(4);
        let settings = settings_with_turns(3);
        let mut assembler = AudioAssembler::new(&mut synth, &settings, dir.path());

        let report = assembler
            .assemble(&lines(&[
                "Agent A (calm): one",
                "Agent B (tense): FAIL two",
                "Agent A (calm): three",
            ]))
            .unwrap();

        assert_eq!(report.clips.len(), 2);
        assert_eq!(report.failed_turns, vec![2]);
        assert!(dir.path().join("audio/turn_1.wav").exists());
        assert!(!dir.path().join("audio/turn_2.wav").exists());

        let merged = report.merged.unwrap();
        assert_eq!(merged.segments, 2);
        let (samples, spec) = read_clip(&merged.path).unwrap();
        assert_eq!(spec.sample_rate, 8_000);
        assert_eq!(samples.len(), 8);
        assert!(samples[..4].iter().all(|&s| (s - 0.1).abs() < 1e-6));
        assert!(samples[4..].iter().all(|&s| (s - 0.3).abs() < 1e-6));
    }

    #[test]
    fn test_voice_selection_by_label() {
        let dir = tempfile::tempdir().unwrap();
        let mut synth = Tone::new(1);
        let settings = settings_with_turns(2);
        let mut assembler = AudioAssembler::new(&mut synth, &settings, dir.path());

        assert_eq!(assembler.voice_for_label("Agent A (Anxious)"), "male");
        assert_eq!(assembler.voice_for_label("Agent B (Angry)"), "female");

        assembler
            .assemble(&lines(&["Agent A (x): hi", "Agent B (y): hello"]))
            .unwrap();
        assert_eq!(synth.voices, vec!["male".to_string(), "female".to_string()]);
    }

    #[test]
    fn test_zero_clips_reports_no_track() {
        let dir = tempfile::tempdir().unwrap();
        let mut synth = Tone::new(2);
        let settings = settings_with_turns(2);
        let mut assembler = AudioAssembler::new(&mut synth, &settings, dir.path());

        let report = assembler
            .assemble(&lines(&["Agent A (x): FAIL", "no delimiter here"]))
            .unwrap();

        assert!(report.clips.is_empty());
        assert!(report.merged.is_none());
        assert!(!dir.path().join(MERGED_TRACK).exists());
    }

    #[test]
    fn test_merge_last_sample_rate_wins() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("a.wav");
        let second = dir.path().join("b.wav");
        write_clip(&first, &[0.5; 3], 16_000).unwrap();
        write_clip(&second, &[0.25; 2], 22_050).unwrap();

        let merged = merge_clips(&[first, second], dir.path().join("out.wav"), 0.0)
            .unwrap()
            .unwrap();
        assert_eq!(merged.sample_rate, 22_050);
        assert_eq!(merged.samples, 5);
    }

    #[test]
    fn test_read_int_clip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("int.wav");
        let spec = WavSpec {
            channels: 1,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        writer.write_sample(16_384i16).unwrap();
        writer.write_sample(-32_768i16).unwrap();
        writer.finalize().unwrap();

        let (samples, _) = read_clip(&path).unwrap();
        assert_eq!(samples, vec![0.5, -1.0]);
    }

    #[test]
    fn test_gap_keeps_stereo_frames_aligned() {
        // 0.1s at 10 Hz is one frame, i.e. two samples for stereo
        let left_right = vec![0.25, -0.25];
        let combined = combine_audio_segments(vec![left_right.clone(), left_right], 0.1, 10, 2);

        assert_eq!(combined, vec![0.25, -0.25, 0.0, 0.0, 0.25, -0.25]);
        assert_eq!(combined.len() % 2, 0);
    }

    #[test]
    fn test_merge_inserts_configured_gap() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("a.wav");
        let second = dir.path().join("b.wav");
        write_clip(&first, &[0.5; 3], 100).unwrap();
        write_clip(&second, &[0.5; 3], 100).unwrap();

        let merged = merge_clips(&[first, second], dir.path().join("out.wav"), 0.05)
            .unwrap()
            .unwrap();
        assert_eq!(merged.samples, 3 + 5 + 3);
    }

    #[test]
    fn test_long_utterance_without_sentence_break_is_chunked() {
        let clause = "the labour market keeps shifting as automation spreads";
        let utterance = vec![clause; 6].join(", ");
        assert!(utterance.len() > 300);
        assert!(!utterance.contains('.'));

        let chunks = split_into_chunks(&utterance, KokoroSynthesizer::MAX_CHUNK_CHARS);

        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            assert!(chunk.len() <= KokoroSynthesizer::MAX_CHUNK_CHARS);
        }
        let rejoined: Vec<&str> = chunks.iter().flat_map(|c| c.split_whitespace()).collect();
        let original: Vec<&str> = utterance.split_whitespace().collect();
        assert_eq!(rejoined, original);
    }

    #[test]
    fn test_short_replies_share_a_chunk() {
        let chunks = split_into_chunks("Agreed. Go on! Why?", 200);
        assert_eq!(chunks, vec!["Agreed. Go on! Why?".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_provider_reports_every_turn_missing() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_with_turns(3);
        let transcript = lines(&[
            "Agent A (calm): one",
            "Agent B (calm): two",
            "Agent A (calm): three",
        ]);

        let report = render_transcript(&settings, &transcript, dir.path())
            .await
            .unwrap();

        assert!(report.clips.is_empty());
        assert_eq!(report.failed_turns, vec![1, 2, 3]);
        assert!(report.merged.is_none());
        assert!(!dir.path().join(MERGED_TRACK).exists());
    }

    #[test]
    fn test_resolve_kokoro_voice_aliases() {
        assert_eq!(resolve_kokoro_voice("male"), "bm_george");
        assert_eq!(resolve_kokoro_voice("Female"), "bf_emma");
        assert_eq!(resolve_kokoro_voice("af_sky"), "af_sky");
    }
}
