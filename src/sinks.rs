// Destinations for progress frames
//
// A sink receives canvases one at a time from the progress recorder thread and
// is finished exactly once when the painting ends.

use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, Frame};
use log::info;

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::canvas::Canvas;
use crate::error::{PaintError, Result};

/// Something that consumes progress frames
///
/// **Rust Concept: Traits as seams**
/// The recorder thread only knows "push frames, then finish". Writing a GIF,
/// keeping frames in memory for a test, or streaming them to a UI are all just
/// different `impl FrameSink` blocks.
pub trait FrameSink {
    fn push(&mut self, frame: &Canvas) -> Result<()>;

    /// Called once after the last frame; flush and close here
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Keeps every frame in memory
///
/// Clones share the same storage, so a test (or an embedding app) can keep one
/// handle while the recorder thread owns the other.
#[derive(Clone, Debug, Default)]
pub struct CollectingSink {
    inner: Arc<Mutex<Collected>>,
}

#[derive(Debug, Default)]
struct Collected {
    frames: Vec<Canvas>,
    finished: bool,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Collected> {
        // A panicking pusher can't leave a half-written Vec behind
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn frames(&self) -> Vec<Canvas> {
        self.lock().frames.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_finished(&self) -> bool {
        self.lock().finished
    }
}

impl FrameSink for CollectingSink {
    fn push(&mut self, frame: &Canvas) -> Result<()> {
        self.lock().frames.push(frame.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.lock().finished = true;
        Ok(())
    }
}

/// Pick a path that does not clobber an existing file
///
/// `name.gif` → `name - Copy.gif` → `name - Copy (2).gif` → ...
pub fn unique_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let parent = path.parent().unwrap_or_else(|| Path::new(""));

    let mut counter = 1;
    loop {
        let name = if counter == 1 {
            format!("{} - Copy{}", stem, extension)
        } else {
            format!("{} - Copy ({}){}", stem, counter, extension)
        };
        let candidate = parent.join(name);
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

/// Streams frames into an animated GIF
pub struct GifSink {
    encoder: Option<GifEncoder<BufWriter<File>>>,
    delay: Delay,
    path: PathBuf,
    frames: usize,
}

impl GifSink {
    /// Quantization speed handed to the encoder (1 = best, 30 = fastest)
    const SPEED: i32 = 10;

    /// Create the GIF file at `path`, or at a "- Copy" variant if it exists
    pub fn create<P: AsRef<Path>>(path: P, fps: u32) -> Result<Self> {
        let path = unique_path(path.as_ref());
        let file = File::create(&path)?;

        let mut encoder = GifEncoder::new_with_speed(BufWriter::new(file), Self::SPEED);
        encoder.set_repeat(Repeat::Infinite)?;

        Ok(Self {
            encoder: Some(encoder),
            delay: Delay::from_numer_denom_ms(1000, fps.max(1)),
            path,
            frames: 0,
        })
    }

    /// Where the GIF is being written
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FrameSink for GifSink {
    fn push(&mut self, frame: &Canvas) -> Result<()> {
        let encoder = self
            .encoder
            .as_mut()
            .ok_or(PaintError::ChannelClosed("gif sink"))?;

        encoder.encode_frame(Frame::from_parts(frame.to_rgba8(), 0, 0, self.delay))?;
        self.frames += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        // Dropping the encoder writes the GIF trailer
        if self.encoder.take().is_some() {
            info!("Wrote {} frames to {}", self.frames, self.path.display());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("stroke-painter-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_collecting_sink_shares_storage() {
        let handle = CollectingSink::new();
        let mut sink = handle.clone();

        sink.push(&Canvas::with_color(2, 2, [0.0, 0.0, 0.0])).unwrap();
        sink.push(&Canvas::with_color(2, 2, [1.0, 1.0, 1.0])).unwrap();
        sink.finish().unwrap();

        assert_eq!(handle.len(), 2);
        assert!(handle.is_finished());
        assert_eq!(handle.frames()[1].pixel(0, 0), [1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_unique_path_adds_copy_suffixes() {
        let dir = scratch_dir("unique");
        let base = dir.join("progress.gif");
        assert_eq!(unique_path(&base), base);

        std::fs::write(&base, b"x").unwrap();
        let first = unique_path(&base);
        assert_eq!(first, dir.join("progress - Copy.gif"));

        std::fs::write(&first, b"x").unwrap();
        assert_eq!(unique_path(&base), dir.join("progress - Copy (2).gif"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_gif_sink_writes_file() {
        let dir = scratch_dir("gif");
        let mut sink = GifSink::create(dir.join("run.gif"), 10).unwrap();

        sink.push(&Canvas::with_color(4, 6, [1.0, 0.0, 0.0])).unwrap();
        sink.push(&Canvas::with_color(4, 6, [0.0, 0.0, 1.0])).unwrap();
        sink.finish().unwrap();

        let bytes = std::fs::read(sink.path()).unwrap();
        assert!(bytes.starts_with(b"GIF89a"));
        // Pushing after finish is refused
        assert!(sink.push(&Canvas::with_color(4, 6, [0.0, 0.0, 0.0])).is_err());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
