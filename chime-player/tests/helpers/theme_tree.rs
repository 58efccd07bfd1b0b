//! Temporary sound theme trees
//!
//! Builds `<root>/<theme>/index.theme` plus sound files under a `TempDir` so
//! theme resolution runs against real directories.

use chime_common::EngineConfig;
use hound::{WavSpec, WavWriter};
use std::f32::consts::PI;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Write a 440 Hz sine WAV (16-bit)
pub fn write_wav<P: AsRef<Path>>(path: P, duration_ms: u32, sample_rate: u32, channels: u16) {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    if let Some(parent) = path.as_ref().parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let mut writer = WavWriter::create(path, spec).unwrap();
    let frames = sample_rate * duration_ms / 1000;
    for i in 0..frames {
        let value = (2.0 * PI * 440.0 * i as f32 / sample_rate as f32).sin() * 0.5;
        for _ in 0..channels {
            writer.write_sample((value * i16::MAX as f32) as i16).unwrap();
        }
    }
    writer.finalize().unwrap();
}

pub struct ThemeTree {
    dir: TempDir,
}

impl ThemeTree {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    /// Directory holding the themes (what `sound_dirs` points at)
    pub fn root(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Declare a theme with a `stereo` and a `5.1` directory
    pub fn theme(&self, name: &str, inherits: &[&str]) -> &Self {
        let dir = self.root().join(name);
        std::fs::create_dir_all(&dir).unwrap();
        let mut index = format!("[Sound Theme]\nName={}\n", name);
        if !inherits.is_empty() {
            index.push_str(&format!("Inherits={}\n", inherits.join(",")));
        }
        index.push_str("Directories=stereo,5.1\n\n[stereo]\nOutputProfile=stereo\n\n[5.1]\nOutputProfile=5.1\n");
        std::fs::write(dir.join("index.theme"), index).unwrap();
        self
    }

    /// Add a short WAV for `event` in the theme's `stereo` directory
    pub fn sound(&self, theme: &str, event: &str) -> PathBuf {
        self.sound_in(theme, "stereo", event, "wav")
    }

    /// Add a short WAV named `<event>.<ext>` under `<theme>/<subdir>`
    pub fn sound_in(&self, theme: &str, subdir: &str, event: &str, ext: &str) -> PathBuf {
        let path = self.root().join(theme).join(subdir).join(format!("{}.{}", event, ext));
        write_wav(&path, 50, 8000, 1);
        path
    }

    /// Add a file with arbitrary contents
    pub fn raw(&self, theme: &str, subdir: &str, name: &str, contents: &[u8]) -> PathBuf {
        let dir = self.root().join(theme).join(subdir);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    /// Mark `event` disabled in `theme`
    pub fn disable(&self, theme: &str, event: &str) {
        self.raw(theme, "stereo", &format!("{}.disabled", event), b"");
    }

    /// Engine configuration searching only this tree
    pub fn config(&self) -> EngineConfig {
        EngineConfig {
            sound_dirs: vec![self.root()],
            ..Default::default()
        }
    }
}
