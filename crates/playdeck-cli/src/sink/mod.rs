//! Local audio sink
//!
//! Plays catalog sources from disk. Each loaded source gets a decode
//! thread feeding a cpal stream; the sink itself stays on the host thread
//! and turns pipeline state into [`SinkEvent`]s when polled.

mod decoder;
mod output;

use std::collections::VecDeque;
use std::path::{ Path, PathBuf };
use std::sync::atomic::{ AtomicBool, AtomicU64, Ordering };
use std::sync::Arc;
use std::thread;
use std::time::{ Duration, Instant };

use playdeck_core::{ MediaSink, PlayRequest, PlaybackRejected, SinkEvent };
use rubato::{ FastFixedOut, PolynomialDegree, Resampler };
use thiserror::Error;

use decoder::TrackDecoder;
use output::{ AudioOutput, SampleRing };


/// How often position reports are emitted while output runs.
const TIME_UPDATE_INTERVAL: Duration = Duration::from_millis( 250 );


/// Errors raised while opening or running a pipeline.
#[derive( Debug, Error )]
pub enum SinkError {
    #[error( "Failed to open source: {0}" )]
    Io( #[from] std::io::Error ),

    #[error( "Decode error: {0}" )]
    Decode( String ),

    #[error( "Audio output error: {0}" )]
    Output( String ),
}


/// Converts planar samples back to interleaved format.
fn interleave( channels: &[Vec<f32>] ) -> Vec<f32> {
    let frames = channels.first().map( Vec::len ).unwrap_or( 0 );
    let mut out = Vec::with_capacity( frames * channels.len() );
    for f in 0..frames {
        for ch in channels {
            out.push( ch[ f ] );
        }
    }
    out
}


/// Decode thread, ring and stream for one loaded source.
struct Pipeline {
    stop_flag: Arc<AtomicBool>,
    ring: Arc<SampleRing>,
    // Dropping the output stops the device stream
    _output: AudioOutput,
    thread: Option<thread::JoinHandle<()>>,
    frames_decoded: Arc<AtomicU64>,
    sample_rate: u32,
    ended: Arc<AtomicBool>,
}


impl Pipeline {
    /// Opens `path` at `position` seconds. Output starts paused.
    ///
    /// @returns The pipeline and the track duration, if known
    fn start( path: &Path, position: f64 ) -> Result<( Self, Option<f64> ), SinkError> {
        let mut decoder = TrackDecoder::open( path )?;
        if position > 0.0 {
            decoder.seek( position )?;
        }

        let source_rate = decoder.sample_rate();
        let channels = decoder.channels();
        let duration = decoder.duration();

        let ( output, ring ) = AudioOutput::open( source_rate, channels )?;

        let resampler = if output.sample_rate() != source_rate {
            tracing::info!( "Resampling: {} Hz → {} Hz", source_rate, output.sample_rate() );
            let resampler = FastFixedOut::<f32>::new(
                output.sample_rate() as f64 / source_rate as f64,
                2.0,
                PolynomialDegree::Cubic,
                1024,
                channels,
            ).map_err( |e| SinkError::Output( format!( "Failed to create resampler: {}", e ) ) )?;
            Some( resampler )
        } else {
            None
        };

        output.start()?;

        let stop_flag = Arc::new( AtomicBool::new( false ) );
        let frames_decoded = Arc::new( AtomicU64::new( ( position * source_rate as f64 ) as u64 ) );
        let ended = Arc::new( AtomicBool::new( false ) );

        let thread = {
            let ring = Arc::clone( &ring );
            let stop_flag = Arc::clone( &stop_flag );
            let frames_decoded = Arc::clone( &frames_decoded );
            let ended = Arc::clone( &ended );
            thread::spawn( move || decode_loop( decoder, ring, stop_flag, resampler, frames_decoded, ended ) )
        };

        Ok((
            Self {
                stop_flag,
                ring,
                _output: output,
                thread: Some( thread ),
                frames_decoded,
                sample_rate: source_rate,
                ended,
            },
            duration,
        ))
    }


    fn position( &self ) -> f64 {
        self.frames_decoded.load( Ordering::Relaxed ) as f64 / self.sample_rate as f64
    }


    fn ended( &self ) -> bool {
        self.ended.load( Ordering::Relaxed )
    }
}


impl Drop for Pipeline {
    fn drop( &mut self ) {
        self.stop_flag.store( true, Ordering::Relaxed );
        if let Some( thread ) = self.thread.take() {
            let _ = thread.join();
        }
    }
}


/// Feeds decoded (and if needed resampled) samples into the ring until
/// stopped or the track runs out.
fn decode_loop(
    mut decoder: TrackDecoder,
    ring: Arc<SampleRing>,
    stop_flag: Arc<AtomicBool>,
    mut resampler: Option<FastFixedOut<f32>>,
    frames_decoded: Arc<AtomicU64>,
    ended: Arc<AtomicBool>,
) {
    let channels = decoder.channels();
    // Keep about 50ms buffered ahead of the device
    let target_fill = decoder.sample_rate() as usize * channels / 20;
    let mut planar: Vec<Vec<f32>> = vec![ Vec::new(); channels ];

    loop {
        if stop_flag.load( Ordering::Relaxed ) {
            break;
        }
        if ring.is_paused() || ring.len() > target_fill {
            thread::sleep( Duration::from_millis( 5 ) );
            continue;
        }

        match decoder.decode_next() {
            Ok( Some( samples ) ) => {
                frames_decoded.fetch_add( ( samples.len() / channels ) as u64, Ordering::Relaxed );
                let out = match resampler.as_mut() {
                    Some( resampler ) => resample( resampler, &mut planar, &samples, channels ),
                    None => samples,
                };
                push_all( &ring, &out, &stop_flag );
            }
            Ok( None ) => {
                if let Some( resampler ) = resampler.as_mut() {
                    if !planar[ 0 ].is_empty() {
                        match resampler.process_partial( Some( planar.as_slice() ), None ) {
                            Ok( tail ) => push_all( &ring, &interleave( &tail ), &stop_flag ),
                            Err( e ) => tracing::error!( "Final resample error: {}", e ),
                        }
                    }
                }

                while !ring.is_empty() && !stop_flag.load( Ordering::Relaxed ) {
                    thread::sleep( Duration::from_millis( 10 ) );
                }
                tracing::debug!( "Decode loop: reached end of track" );
                ended.store( true, Ordering::Relaxed );
                break;
            }
            Err( e ) => {
                tracing::error!( "Decode error: {}", e );
                break;
            }
        }
    }
}


fn resample(
    resampler: &mut FastFixedOut<f32>,
    planar: &mut Vec<Vec<f32>>,
    samples: &[f32],
    channels: usize,
) -> Vec<f32> {
    for frame in samples.chunks( channels ) {
        for ( ch, sample ) in frame.iter().enumerate() {
            planar[ ch ].push( *sample );
        }
    }

    let mut out = Vec::new();
    while planar[ 0 ].len() >= resampler.input_frames_next() {
        let needed = resampler.input_frames_next();
        let chunk: Vec<Vec<f32>> = planar.iter_mut().map( |ch| ch.drain( ..needed ).collect() ).collect();

        match resampler.process( chunk.as_slice(), None ) {
            Ok( resampled ) => out.extend( interleave( &resampled ) ),
            Err( e ) => {
                tracing::error!( "Resample error: {}", e );
                break;
            }
        }
    }
    out
}


fn push_all( ring: &SampleRing, samples: &[f32], stop_flag: &AtomicBool ) {
    let mut offset = 0;
    while offset < samples.len() && !stop_flag.load( Ordering::Relaxed ) {
        let pushed = ring.push( &samples[ offset.. ] );
        offset += pushed;
        if pushed == 0 {
            thread::sleep( Duration::from_millis( 5 ) );
        }
    }
}


/// Media sink backed by local files and the default output device.
pub struct AudioSink {
    source: Option<PathBuf>,
    pipeline: Option<Pipeline>,
    duration: Option<f64>,
    /// Position used while no pipeline is open
    position: f64,
    volume: f64,
    muted: bool,
    events: VecDeque<SinkEvent>,
    last_time_update: Instant,
    ended_reported: bool,
}


impl AudioSink {
    pub fn new() -> Self {
        Self {
            source: None,
            pipeline: None,
            duration: None,
            position: 0.0,
            volume: 1.0,
            muted: false,
            events: VecDeque::new(),
            last_time_update: Instant::now(),
            ended_reported: false,
        }
    }


    /// Drains notifications raised since the last poll.
    pub fn poll_events( &mut self ) -> Vec<SinkEvent> {
        let mut events: Vec<SinkEvent> = self.events.drain( .. ).collect();

        let ( ended, running ) = match &self.pipeline {
            Some( p ) => ( p.ended(), !p.ring.is_paused() ),
            None => ( false, false ),
        };

        if ended && !self.ended_reported {
            self.ended_reported = true;
            events.push( SinkEvent::Ended );
        } else if running && !ended && self.last_time_update.elapsed() >= TIME_UPDATE_INTERVAL {
            self.last_time_update = Instant::now();
            events.push( SinkEvent::TimeUpdate {
                current_time: self.current_time(),
                duration: self.duration,
            });
        }

        events
    }


    /// Replaces the pipeline with one opened at `position`.
    fn reopen( &mut self, position: f64, paused: bool ) -> Result<(), SinkError> {
        // Old stream and thread go first so two devices are never open at once
        self.pipeline = None;
        self.position = position;

        let path = self.source.clone()
            .ok_or_else( || SinkError::Decode( "no source loaded".into() ) )?;
        let ( pipeline, duration ) = Pipeline::start( &path, position )?;
        pipeline.ring.set_paused( paused );

        self.duration = duration;
        self.pipeline = Some( pipeline );
        self.ended_reported = false;
        self.apply_gain();
        Ok(())
    }


    fn apply_gain( &self ) {
        if let Some( pipeline ) = &self.pipeline {
            let gain = if self.muted { 0.0 } else { self.volume as f32 };
            pipeline.ring.set_gain( gain );
        }
    }
}


impl Default for AudioSink {
    fn default() -> Self {
        Self::new()
    }
}


impl MediaSink for AudioSink {
    fn set_source( &mut self, locator: &str ) {
        self.source = Some( PathBuf::from( locator ) );
        self.duration = None;

        match self.reopen( 0.0, true ) {
            Ok(()) => {
                // Unknown-length sources still report metadata, as an infinite duration
                let duration = self.duration.unwrap_or( f64::INFINITY );
                self.events.push_back( SinkEvent::LoadedMetadata { duration } );
            }
            Err( e ) => {
                tracing::warn!( "Failed to load {}: {}", locator, e );
            }
        }
    }


    fn play( &mut self ) -> PlayRequest {
        let needs_reopen = self.pipeline.as_ref().map_or( true, Pipeline::ended );
        if needs_reopen {
            let restart_at = if self.pipeline.is_some() { 0.0 } else { self.position };
            if let Err( e ) = self.reopen( restart_at, false ) {
                return PlayRequest::resolved( Err( PlaybackRejected::new( e.to_string() ) ) );
            }
        }

        match &self.pipeline {
            Some( pipeline ) => {
                pipeline.ring.set_paused( false );
                self.last_time_update = Instant::now();
                PlayRequest::resolved( Ok(()) )
            }
            None => PlayRequest::resolved( Err( PlaybackRejected::new( "no source loaded" ) ) ),
        }
    }


    fn pause( &mut self ) {
        if let Some( pipeline ) = &self.pipeline {
            pipeline.ring.set_paused( true );
        }
    }


    fn current_time( &self ) -> f64 {
        let position = self.pipeline.as_ref().map_or( self.position, Pipeline::position );
        match self.duration {
            Some( duration ) => position.min( duration ),
            None => position,
        }
    }


    fn set_current_time( &mut self, seconds: f64 ) {
        let paused = self.pipeline.as_ref().map_or( true, |p| p.ring.is_paused() );
        if self.source.is_none() {
            self.position = seconds;
            return;
        }

        if let Err( e ) = self.reopen( seconds, paused ) {
            tracing::warn!( "Seek to {:.1}s failed: {}", seconds, e );
        }
    }


    fn duration( &self ) -> Option<f64> {
        self.duration
    }


    fn volume( &self ) -> f64 {
        self.volume
    }


    fn set_volume( &mut self, volume: f64 ) {
        self.volume = volume;
        self.apply_gain();
    }


    fn muted( &self ) -> bool {
        self.muted
    }


    fn set_muted( &mut self, muted: bool ) {
        self.muted = muted;
        self.apply_gain();
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_interleave() {
        let planar = vec![ vec![ 1.0, 2.0 ], vec![ -1.0, -2.0 ] ];
        assert_eq!( interleave( &planar ), vec![ 1.0, -1.0, 2.0, -2.0 ] );
        assert!( interleave( &[] ).is_empty() );
    }


    #[test]
    fn test_missing_source_rejects_play() {
        let mut sink = AudioSink::new();
        sink.set_source( "/definitely/not/here.mp3" );

        assert_eq!( sink.duration(), None );
        assert!( sink.poll_events().is_empty() );
        assert!( matches!( sink.play().try_outcome(), Some( Err( _ ) ) ) );
    }


    #[test]
    fn test_state_without_pipeline() {
        let mut sink = AudioSink::new();

        sink.set_volume( 0.25 );
        sink.set_muted( true );
        sink.set_current_time( 12.0 );

        assert_eq!( sink.volume(), 0.25 );
        assert!( sink.muted() );
        assert_eq!( sink.current_time(), 12.0 );
    }
}
