use std::fs::{self, File};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::thread;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use sha2::{Digest, Sha256};

use crate::models::audio_models::{LevelEvent, PcmBuffer};
use crate::models::error::WriterError;
use crate::models::recording::CaptureSummary;
use crate::processing::wav_format::{SinkFormat, WAV_HEADER_SIZE};
use crate::processing::{level, pcm};
use crate::traits::capture_source::BufferSink;

/// Streaming 16-bit PCM WAV file.
///
/// ```text
/// [44-byte WAV header, data size patched on close]
/// [interleaved little-endian i16 frames...]
/// ```
struct SinkFile {
    file_path: PathBuf,
    format: SinkFormat,
    file: Option<BufWriter<File>>,
    data_bytes: u64,
    limit: u64,
}

impl SinkFile {
    fn open(file_path: PathBuf, format: SinkFormat, limit: u64) -> Result<Self, WriterError> {
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).map_err(|e| WriterError::Open(format!("failed to create directory: {}", e)))?;
        }

        let file = File::create(&file_path).map_err(|e| WriterError::Open(format!("failed to create file: {}", e)))?;
        let mut file = BufWriter::new(file);
        file.write_all(&format.header(0))
            .map_err(|e| WriterError::Open(format!("failed to write header: {}", e)))?;

        Ok(Self {
            file_path,
            format,
            file: Some(file),
            data_bytes: 0,
            limit: limit.min(format.max_data_bytes()),
        })
    }

    fn write(&mut self, data: &[u8]) -> Result<(), WriterError> {
        let file = self.file.as_mut().ok_or(WriterError::Closed)?;
        if self.data_bytes + data.len() as u64 > self.limit {
            return Err(WriterError::SizeLimit(self.limit));
        }
        file.write_all(data).map_err(|e| WriterError::Write(e.to_string()))?;
        self.data_bytes += data.len() as u64;
        Ok(())
    }

    /// Rewrite the header with the final sizes, flush, and checksum the file.
    fn close(&mut self) -> Result<(u64, String), WriterError> {
        let mut file = self.file.take().ok_or(WriterError::Closed)?;
        let data_size = u32::try_from(self.data_bytes)
            .map_err(|_| WriterError::Close(format!("{} bytes exceed the WAV size limit", self.data_bytes)))?;

        file.seek(SeekFrom::Start(0)).map_err(|e| WriterError::Close(e.to_string()))?;
        file.write_all(&self.format.header(data_size))
            .map_err(|e| WriterError::Close(e.to_string()))?;
        file.flush().map_err(|e| WriterError::Close(e.to_string()))?;
        drop(file);

        let checksum = sha256_file(&self.file_path)?;
        Ok((self.format.frames_in(self.data_bytes), checksum))
    }
}

enum WriterCommand {
    Write(PcmBuffer),
    Close(Sender<Result<CaptureSummary, WriterError>>),
}

/// Cloneable handle that queues buffers onto the writer thread.
///
/// Safe to call from any thread; queued buffers are written in send order.
#[derive(Clone)]
pub struct SinkInput {
    commands: Sender<WriterCommand>,
}

impl SinkInput {
    /// Queue a buffer. Returns `false` once the writer has closed.
    pub fn write_buffer(&self, buffer: PcmBuffer) -> bool {
        self.commands.send(WriterCommand::Write(buffer)).is_ok()
    }
}

impl BufferSink for SinkInput {
    fn accept(&self, buffer: PcmBuffer) -> bool {
        self.write_buffer(buffer)
    }
}

/// Audio sink writer.
///
/// All file I/O runs on one dedicated `sink-writer` thread, regardless of
/// which thread delivers buffers. Each written buffer produces one
/// [`LevelEvent`] on the level channel; events that do not fit are dropped.
pub struct SinkWriter {
    file_path: PathBuf,
    commands: Sender<WriterCommand>,
    worker: Option<thread::JoinHandle<()>>,
    failures: Receiver<WriterError>,
    summary: Option<CaptureSummary>,
}

impl SinkWriter {
    /// Create the sink file, write the placeholder header, and start the writer thread.
    pub fn open(file_path: PathBuf, format: SinkFormat, levels: Sender<LevelEvent>) -> Result<Self, WriterError> {
        Self::open_with_limit(file_path, format, levels, format.max_data_bytes())
    }

    /// Like [`open`](Self::open), but stop accepting audio after `limit`
    /// data bytes. The WAV limit still applies if `limit` is larger.
    pub fn open_with_limit(
        file_path: PathBuf,
        format: SinkFormat,
        levels: Sender<LevelEvent>,
        limit: u64,
    ) -> Result<Self, WriterError> {
        let sink = SinkFile::open(file_path.clone(), format, limit)?;
        let (commands, queue) = crossbeam_channel::unbounded();
        let (failure_tx, failures) = crossbeam_channel::bounded(1);

        let worker = thread::Builder::new()
            .name("sink-writer".into())
            .spawn(move || run_writer(sink, queue, levels, failure_tx))
            .map_err(|e| WriterError::Open(format!("failed to spawn writer thread: {}", e)))?;

        Ok(Self {
            file_path,
            commands,
            worker: Some(worker),
            failures,
            summary: None,
        })
    }

    /// Reports the first error that stopped the writer from taking audio.
    ///
    /// Disconnects once the writer thread exits.
    pub fn failures(&self) -> Receiver<WriterError> {
        self.failures.clone()
    }

    pub fn input(&self) -> SinkInput {
        SinkInput {
            commands: self.commands.clone(),
        }
    }

    pub fn write_buffer(&self, buffer: PcmBuffer) -> bool {
        self.commands.send(WriterCommand::Write(buffer)).is_ok()
    }

    /// Flush and close the file on the writer thread.
    ///
    /// Buffers queued before this call are written first. Repeated calls
    /// return the summary of the first successful close.
    pub fn close(&mut self) -> Result<CaptureSummary, WriterError> {
        if let Some(summary) = &self.summary {
            return Ok(summary.clone());
        }
        let Some(worker) = self.worker.take() else {
            return Err(WriterError::Closed);
        };

        let (reply, response) = crossbeam_channel::bounded(1);
        let result = match self.commands.send(WriterCommand::Close(reply)) {
            Ok(()) => response
                .recv()
                .unwrap_or_else(|_| Err(WriterError::Close("writer thread exited".into()))),
            Err(_) => Err(WriterError::Close("writer thread exited".into())),
        };
        if worker.join().is_err() {
            log::error!("Sink writer thread panicked");
        }

        if let Ok(summary) = &result {
            self.summary = Some(summary.clone());
        }
        result
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }
}

impl Drop for SinkWriter {
    fn drop(&mut self) {
        if self.worker.is_some() {
            if let Err(e) = self.close() {
                log::warn!("Sink writer dropped without a clean close: {}", e);
            }
        }
    }
}

fn run_writer(
    mut sink: SinkFile,
    queue: Receiver<WriterCommand>,
    levels: Sender<LevelEvent>,
    failures: Sender<WriterError>,
) {
    let mut dropped_buffers = 0u64;
    let mut halted: Option<WriterError> = None;

    for command in queue.iter() {
        match command {
            WriterCommand::Write(buffer) => {
                if halted.is_some() {
                    continue;
                }
                if let Err(reason) = check_buffer(&buffer, sink.format.channels) {
                    log::warn!("Dropping invalid buffer at {:?}: {}", buffer.timestamp, reason);
                    dropped_buffers += 1;
                    continue;
                }

                let samples = buffer.interleaved_samples();
                if let Err(e) = sink.write(&pcm::to_i16_le_bytes(&samples)) {
                    log::error!("Sink writer stopped taking audio: {}", e);
                    let _ = failures.try_send(e.clone());
                    halted = Some(e);
                    continue;
                }

                let event = LevelEvent {
                    level: level::loudness(&samples),
                    timestamp: buffer.timestamp,
                };
                if let Err(TrySendError::Full(_)) = levels.try_send(event) {
                    log::trace!("Level event dropped");
                }
            }
            WriterCommand::Close(reply) => {
                let result = finish(&mut sink, dropped_buffers, halted.take());
                let _ = reply.send(result);
                return;
            }
        }
    }

    // All handles dropped without a close request.
    if let Err(e) = sink.close() {
        log::warn!("Failed to finalize {}: {}", sink.file_path.display(), e);
    }
}

fn check_buffer(buffer: &PcmBuffer, channels: u16) -> Result<(), String> {
    buffer.validate()?;
    if buffer.channels != channels {
        return Err(format!("expected {} channels, got {}", channels, buffer.channels));
    }
    Ok(())
}

/// A writer halted by the size limit still closes to a valid file; any
/// other halt makes the close fail.
fn finish(sink: &mut SinkFile, dropped_buffers: u64, halted: Option<WriterError>) -> Result<CaptureSummary, WriterError> {
    let closed = sink.close();
    match halted {
        None | Some(WriterError::SizeLimit(_)) => {}
        Some(e) => return Err(e),
    }
    let (frames_written, checksum) = closed?;
    Ok(CaptureSummary {
        file_path: sink.file_path.clone(),
        frames_written,
        duration_secs: frames_written as f64 / sink.format.sample_rate as f64,
        dropped_buffers,
        checksum,
    })
}

/// Compute SHA-256 hex digest of a file.
fn sha256_file(path: &Path) -> Result<String, WriterError> {
    let data = fs::read(path).map_err(|e| WriterError::Close(format!("failed to read file for checksum: {}", e)))?;
    let digest = Sha256::digest(&data);
    Ok(digest.iter().map(|b| format!("{:02x}", b)).collect())
}
