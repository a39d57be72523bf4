//! Audio output via cpal
//!
//! A shared sample ring filled by the decode thread and drained by the
//! device callback, plus the stream that owns the callback.

use std::collections::VecDeque;
use std::sync::atomic::{ AtomicBool, AtomicU32, Ordering };
use std::sync::{ Arc, Mutex, MutexGuard };

use cpal::traits::{ DeviceTrait, HostTrait, StreamTrait };

use super::SinkError;


/// Samples queued between the decode thread and the device callback.
///
/// Converts between source and device channel counts on the way out and
/// applies the current gain.
pub struct SampleRing {
    buffer: Mutex<VecDeque<f32>>,
    capacity: usize,
    paused: AtomicBool,
    /// Gain stored as f32 bits
    gain: AtomicU32,
    source_channels: usize,
    output_channels: usize,
}


impl SampleRing {
    pub fn new( capacity: usize, source_channels: usize, output_channels: usize ) -> Self {
        Self {
            buffer: Mutex::new( VecDeque::with_capacity( capacity ) ),
            capacity,
            paused: AtomicBool::new( true ),
            gain: AtomicU32::new( 1.0_f32.to_bits() ),
            source_channels: source_channels.max( 1 ),
            output_channels: output_channels.max( 1 ),
        }
    }


    // A poisoned lock only means another thread panicked mid-push; the
    // queued samples are still usable.
    fn lock( &self ) -> MutexGuard<'_, VecDeque<f32>> {
        self.buffer.lock().unwrap_or_else( |e| e.into_inner() )
    }


    /// Pushes samples, returning how many fit.
    pub fn push( &self, samples: &[f32] ) -> usize {
        let mut buf = self.lock();
        let to_push = samples.len().min( self.capacity.saturating_sub( buf.len() ) );
        buf.extend( samples[ ..to_push ].iter().copied() );
        to_push
    }


    /// Fills `output` with device frames. Missing samples are written as silence.
    pub fn pop( &self, output: &mut [f32] ) {
        output.fill( 0.0 );
        if self.paused.load( Ordering::Relaxed ) {
            return;
        }

        let gain = f32::from_bits( self.gain.load( Ordering::Relaxed ) );
        let src_ch = self.source_channels;
        let out_ch = self.output_channels;
        let mut buf = self.lock();

        let frames = ( output.len() / out_ch ).min( buf.len() / src_ch );
        let mut frame = Vec::with_capacity( src_ch );

        for out_frame in output.chunks_exact_mut( out_ch ).take( frames ) {
            frame.clear();
            frame.extend( buf.drain( ..src_ch ) );

            if src_ch == 2 && out_ch == 1 {
                out_frame[ 0 ] = ( frame[ 0 ] + frame[ 1 ] ) * 0.5 * gain;
                continue;
            }
            // Extra device channels repeat the last source channel
            for ( ch, sample ) in out_frame.iter_mut().enumerate() {
                *sample = frame[ ch.min( src_ch - 1 ) ] * gain;
            }
        }
    }


    pub fn len( &self ) -> usize {
        self.lock().len()
    }


    pub fn is_empty( &self ) -> bool {
        self.lock().is_empty()
    }


    pub fn set_paused( &self, paused: bool ) {
        self.paused.store( paused, Ordering::Relaxed );
    }


    pub fn is_paused( &self ) -> bool {
        self.paused.load( Ordering::Relaxed )
    }


    pub fn set_gain( &self, gain: f32 ) {
        self.gain.store( gain.to_bits(), Ordering::Relaxed );
    }
}


/// The device stream. Not `Send`; keep it on the thread that created it.
pub struct AudioOutput {
    stream: cpal::Stream,
    sample_rate: u32,
}


impl AudioOutput {
    /// Opens the default output device for a source of the given format.
    ///
    /// Returns the output and the ring the decode thread should fill.
    pub fn open( source_rate: u32, source_channels: usize ) -> Result<( Self, Arc<SampleRing> ), SinkError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else( || SinkError::Output( "no output device available".into() ) )?;

        tracing::info!( "Using output device: {:?}", device.name() );

        let supported: Vec<_> = device
            .supported_output_configs()
            .map_err( |e| SinkError::Output( e.to_string() ) )?
            .collect();
        let rate_fits = |c: &cpal::SupportedStreamConfigRange| {
            c.min_sample_rate().0 <= source_rate && c.max_sample_rate().0 >= source_rate
        };

        // Prefer an exact match, then any config at the source rate, then the default
        let config = if let Some( c ) = supported.iter()
            .find( |c| c.channels() as usize == source_channels && rate_fits( *c ) )
            .or_else( || supported.iter().find( |c| rate_fits( *c ) ) )
        {
            c.clone().with_sample_rate( cpal::SampleRate( source_rate ) ).config()
        } else {
            device
                .default_output_config()
                .map_err( |e| SinkError::Output( e.to_string() ) )?
                .config()
        };

        tracing::info!(
            "Audio output config: {} Hz, {} channels (source {} Hz, {} channels)",
            config.sample_rate.0,
            config.channels,
            source_rate,
            source_channels
        );

        // About half a second of audio
        let capacity = source_rate as usize * source_channels / 2;
        let ring = Arc::new( SampleRing::new( capacity, source_channels, config.channels as usize ) );
        let callback_ring = Arc::clone( &ring );

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    callback_ring.pop( data );
                },
                |err| {
                    tracing::error!( "Audio output error: {}", err );
                },
                None,
            )
            .map_err( |e| SinkError::Output( e.to_string() ) )?;

        Ok(( Self { stream, sample_rate: config.sample_rate.0 }, ring ))
    }


    pub fn start( &self ) -> Result<(), SinkError> {
        self.stream.play().map_err( |e| SinkError::Output( e.to_string() ) )
    }


    /// Actual device sample rate.
    pub fn sample_rate( &self ) -> u32 {
        self.sample_rate
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_paused_ring_outputs_silence() {
        let ring = SampleRing::new( 16, 2, 2 );
        ring.push( &[ 0.5; 8 ] );

        let mut out = [ 1.0; 4 ];
        ring.pop( &mut out );
        assert_eq!( out, [ 0.0; 4 ] );
        assert_eq!( ring.len(), 8 );
    }


    #[test]
    fn test_push_respects_capacity() {
        let ring = SampleRing::new( 4, 1, 1 );
        assert_eq!( ring.push( &[ 0.1; 6 ] ), 4 );
        assert_eq!( ring.push( &[ 0.1 ] ), 0 );
    }


    #[test]
    fn test_mono_to_stereo_with_gain() {
        let ring = SampleRing::new( 16, 1, 2 );
        ring.set_paused( false );
        ring.set_gain( 0.5 );
        ring.push( &[ 1.0, -1.0 ] );

        let mut out = [ 9.0; 6 ];
        ring.pop( &mut out );
        assert_eq!( out, [ 0.5, 0.5, -0.5, -0.5, 0.0, 0.0 ] );
        assert!( ring.is_empty() );
    }


    #[test]
    fn test_stereo_to_mono_mixdown() {
        let ring = SampleRing::new( 16, 2, 1 );
        ring.set_paused( false );
        ring.push( &[ 1.0, 0.0, 0.5, 0.5 ] );

        let mut out = [ 0.0; 2 ];
        ring.pop( &mut out );
        assert_eq!( out, [ 0.5, 0.5 ] );
    }


    #[test]
    fn test_zero_gain_mutes() {
        let ring = SampleRing::new( 16, 2, 2 );
        ring.set_paused( false );
        ring.set_gain( 0.0 );
        ring.push( &[ 0.8; 4 ] );

        let mut out = [ 1.0; 4 ];
        ring.pop( &mut out );
        assert_eq!( out, [ 0.0; 4 ] );
    }
}
