//! CPAL Device Backend
//!
//! Opens the capture device and a playback device through CPAL and wires
//! them together with a lock-free ring:
//!
//! ```text
//! capture callback ──rtrb──▶ playback callback
//!   (mic samples)             ├─ GraphRenderer::render()
//!                             └─ speakers
//! ```
//!
//! CPAL streams are not `Send`, so both live on a dedicated device thread
//! that builds them, reports readiness and then parks until shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig as CpalStreamConfig};
use crossbeam_channel::{bounded, Receiver, Sender};
use rtrb::{Consumer, Producer, RingBuffer};
use tracing::{debug, error, info, warn};

use super::{CaptureBackend, DeviceStream};
use crate::config::EngineConfig;
use crate::device::{find_input_device, find_output_device};
use crate::error::{EngineError, EngineResult};
use crate::graph::{GraphRenderer, RenderMeters};

/// Only one session in the process may hold the capture device
static DEVICE_HELD: AtomicBool = AtomicBool::new(false);

/// Backend for real audio hardware
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalBackend;

impl CpalBackend {
    pub fn new() -> Self {
        Self
    }
}

impl CaptureBackend for CpalBackend {
    fn name(&self) -> &'static str {
        "cpal"
    }

    fn open(
        &self,
        config: &EngineConfig,
        renderer: GraphRenderer,
    ) -> EngineResult<Box<dyn DeviceStream>> {
        if DEVICE_HELD
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(EngineError::DeviceUnavailable(
                "capture device is already held by another session".into(),
            ));
        }

        let (ready_tx, ready_rx) = bounded::<EngineResult<String>>(1);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let thread_config = config.clone();

        let spawned = thread::Builder::new()
            .name("hush-device".into())
            .spawn(move || device_thread_main(thread_config, renderer, ready_tx, shutdown_rx));

        let thread = match spawned {
            Ok(thread) => thread,
            Err(e) => {
                DEVICE_HELD.store(false, Ordering::SeqCst);
                return Err(EngineError::DeviceUnavailable(format!(
                    "failed to spawn device thread: {}",
                    e
                )));
            }
        };

        let outcome = ready_rx.recv().unwrap_or_else(|_| {
            Err(EngineError::DeviceUnavailable(
                "device thread exited during acquisition".into(),
            ))
        });

        match outcome {
            Ok(device_name) => {
                info!("Capture running on '{}'", device_name);
                Ok(Box::new(CpalStream {
                    device_name,
                    shutdown: Some(shutdown_tx),
                    thread: Some(thread),
                }))
            }
            Err(e) => {
                let _ = thread.join();
                DEVICE_HELD.store(false, Ordering::SeqCst);
                Err(into_unavailable(e))
            }
        }
    }
}

/// Every acquisition failure surfaces as `DeviceUnavailable`
fn into_unavailable(err: EngineError) -> EngineError {
    match err {
        EngineError::DeviceUnavailable(_) => err,
        other => EngineError::DeviceUnavailable(other.to_string()),
    }
}

struct CpalStream {
    device_name: String,
    shutdown: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl DeviceStream for CpalStream {
    fn device_name(&self) -> &str {
        &self.device_name
    }

    fn close(self: Box<Self>) {}
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Device thread panicked");
            }
        }
        DEVICE_HELD.store(false, Ordering::SeqCst);
        info!("Capture device '{}' released", self.device_name);
    }
}

/// Open streams; dropping this stops both callbacks
struct OpenStreams {
    _capture: Stream,
    _playback: Stream,
    device_name: String,
}

fn device_thread_main(
    config: EngineConfig,
    renderer: GraphRenderer,
    ready: Sender<EngineResult<String>>,
    shutdown: Receiver<()>,
) {
    let streams = match open_streams(&config, renderer) {
        Ok(streams) => streams,
        Err(e) => {
            warn!("Device acquisition failed: {}", e);
            let _ = ready.send(Err(e));
            return;
        }
    };

    let _ = ready.send(Ok(streams.device_name.clone()));

    // Park until closed (or the handle is dropped)
    let _ = shutdown.recv();
    drop(streams);
    debug!("Device thread exiting");
}

fn open_streams(config: &EngineConfig, renderer: GraphRenderer) -> EngineResult<OpenStreams> {
    let host = cpal::default_host();
    let input = find_input_device(&host, config.input_device.as_deref())?;
    let output = find_output_device(&host, config.output_device.as_deref())?;
    let device_name = input.name().unwrap_or_else(|_| "unknown input".into());

    let cpal_config = CpalStreamConfig {
        channels: config.stream.channels,
        sample_rate: cpal::SampleRate(config.stream.sample_rate),
        buffer_size: cpal::BufferSize::Fixed(config.stream.buffer_size),
    };

    // Microphones are often mono; capture in whatever layout the device
    // offers and remix to the graph's layout in the callback
    let capture_config = CpalStreamConfig {
        channels: capture_channel_count(&input, config)?,
        ..cpal_config.clone()
    };
    if capture_config.channels != cpal_config.channels {
        info!(
            "Capturing {} ch from '{}', remixing to {} ch",
            capture_config.channels, device_name, cpal_config.channels
        );
    }

    let ring_size = config.ring_buffer_frames * config.stream.channels as usize;
    let (producer, consumer) = RingBuffer::<f32>::new(ring_size);
    let meters = renderer.meters();

    let capture = build_capture_stream(
        &input,
        &capture_config,
        config.stream.channels as usize,
        producer,
        Arc::clone(&meters),
    )?;
    let playback = build_playback_stream(&output, &cpal_config, consumer, renderer)?;

    capture
        .play()
        .map_err(|e| EngineError::DeviceUnavailable(e.to_string()))?;
    playback
        .play()
        .map_err(|e| EngineError::DeviceUnavailable(e.to_string()))?;

    Ok(OpenStreams {
        _capture: capture,
        _playback: playback,
        device_name,
    })
}

/// Channel count to open the capture device with
fn capture_channel_count(device: &Device, config: &EngineConfig) -> EngineResult<u16> {
    let rate = config.stream.sample_rate;
    let offered: Vec<u16> = device
        .supported_input_configs()
        .map_err(|e| EngineError::DeviceUnavailable(e.to_string()))?
        .filter(|range| rate >= range.min_sample_rate().0 && rate <= range.max_sample_rate().0)
        .map(|range| range.channels())
        .collect();

    match choose_channels(&offered, config.stream.channels) {
        Some(channels) => Ok(channels),
        None => device
            .default_input_config()
            .map(|default| default.channels())
            .map_err(|e| EngineError::DeviceUnavailable(e.to_string())),
    }
}

/// The wanted count if offered, else the closest offered count
fn choose_channels(offered: &[u16], wanted: u16) -> Option<u16> {
    if offered.contains(&wanted) {
        return Some(wanted);
    }
    offered
        .iter()
        .copied()
        .filter(|&channels| channels > 0)
        .min_by_key(|&channels| (channels.abs_diff(wanted), channels))
}

/// Re-lay interleaved frames from `in_channels` to `out_channels`
///
/// Mono input is copied to every output channel and a fold to mono
/// averages. Other mismatches drop extra channels or repeat the last one.
fn remix(
    input: &[f32],
    in_channels: usize,
    out_channels: usize,
) -> impl Iterator<Item = f32> + '_ {
    input
        .chunks_exact(in_channels.max(1))
        .flat_map(move |frame| (0..out_channels).map(move |c| remix_sample(frame, c, out_channels)))
}

#[inline]
fn remix_sample(frame: &[f32], channel: usize, out_channels: usize) -> f32 {
    match frame.len() {
        n if n == out_channels => frame[channel],
        1 => frame[0],
        n if out_channels == 1 => frame.iter().sum::<f32>() / n as f32,
        n => frame[channel.min(n - 1)],
    }
}

fn build_capture_stream(
    device: &Device,
    config: &CpalStreamConfig,
    graph_channels: usize,
    mut producer: Producer<f32>,
    meters: Arc<RenderMeters>,
) -> EngineResult<Stream> {
    let overflow_meters = Arc::clone(&meters);
    let in_channels = (config.channels as usize).max(1);
    let out_channels = graph_channels.max(1);

    device
        .build_input_stream(
            config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                // Real-time audio callback - NO allocations allowed here
                let wanted = data.len() / in_channels * out_channels;
                let room = producer.slots() / out_channels * out_channels;
                let written = producer.write_chunk_uninit(wanted.min(room)).map_or(0, |chunk| {
                    chunk.fill_from_iter(remix(data, in_channels, out_channels))
                });

                if written < wanted {
                    overflow_meters.record_xrun();
                }
            },
            move |err| {
                warn!("Capture stream error: {}", err);
                meters.record_xrun();
            },
            None,
        )
        .map_err(|e| EngineError::DeviceUnavailable(e.to_string()))
}

fn build_playback_stream(
    device: &Device,
    config: &CpalStreamConfig,
    mut consumer: Consumer<f32>,
    mut renderer: GraphRenderer,
) -> EngineResult<Stream> {
    let meters = renderer.meters();
    let underrun_meters = Arc::clone(&meters);

    device
        .build_output_stream(
            config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                // Real-time audio callback - NO allocations allowed here
                let to_read = data.len().min(consumer.slots());
                if to_read < data.len() {
                    data.fill(0.0);
                    underrun_meters.record_xrun();
                }

                if let Ok(chunk) = consumer.read_chunk(to_read) {
                    let (first, second) = chunk.as_slices();
                    data[..first.len()].copy_from_slice(first);
                    data[first.len()..first.len() + second.len()].copy_from_slice(second);
                    chunk.commit_all();
                }

                renderer.render(data);
            },
            move |err| {
                warn!("Playback stream error: {}", err);
                meters.record_xrun();
            },
            None,
        )
        .map_err(|e| EngineError::DeviceUnavailable(e.to_string()))
}
