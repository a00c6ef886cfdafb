/*!
    Media sink implementation.
*/

use std::path::{Path, PathBuf};

use ffmpeg_next::{
    Dictionary, codec, ffi,
    format::{self, context::Output as OutputContext},
};
use tracing::{debug, warn};

use ffmpeg_source::MediaStream;
use ffmpeg_types::{Chapter, Error, FrameSize, Packet, Rational, Result};

/**
    Media sink for writing to container files.

    Output streams are added one per input stream, in input order, so an
    output stream index always equals the index of the input stream it was
    created from. After [`Sink::write_header`] packets may be written in any
    time base; they are rescaled to the stream's time base, which the muxer
    is free to change while writing the header.
*/
pub struct Sink {
    output: OutputContext,
    path: PathBuf,
    time_bases: Vec<Rational>,
    header_written: bool,
    trailer_written: bool,
}

impl Sink {
    /**
        Create the output file, guessing the container from its extension.
    */
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        ffmpeg_next::init().map_err(|e| Error::codec(e.to_string()))?;

        let path = path.as_ref().to_path_buf();
        let output = format::output(&path).map_err(|e| Error::OpenOutputFailed {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        debug!(path = %path.display(), format = output.format().name(), "opened output");

        Ok(Self {
            output,
            path,
            time_bases: Vec::new(),
            header_written: false,
            trailer_written: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /**
        Whether encoders must put codec headers in extradata rather than in
        the bitstream.
    */
    pub fn needs_global_header(&self) -> bool {
        self.output.format().flags().contains(format::Flags::GLOBAL_HEADER)
    }

    pub fn stream_count(&self) -> usize {
        self.output.nb_streams() as usize
    }

    /**
        Copy container-level metadata.
    */
    pub fn set_metadata(&mut self, metadata: &[(String, String)]) {
        self.output.set_metadata(dictionary(metadata));
    }

    /**
        Copy chapter markers, keeping their ids, time bases and metadata.
    */
    pub fn add_chapters(&mut self, chapters: &[Chapter]) -> Result<()> {
        for chapter in chapters {
            let mut added = self
                .output
                .add_chapter(
                    chapter.id,
                    ffmpeg_next::Rational::from(chapter.time_base),
                    chapter.start,
                    chapter.end,
                    chapter.title().unwrap_or_default(),
                )
                .map_err(|e| Error::mux(format!("adding chapter {}: {e}", chapter.id)))?;
            for (key, value) in &chapter.metadata {
                added.set_metadata(key, value);
            }
        }
        Ok(())
    }

    /**
        Add a stream whose packets are copied unchanged.

        Codec parameters are copied byte for byte. A video stream with no
        coded size (some cover art) takes `fallback_size` instead.
    */
    pub fn add_passthrough_stream(
        &mut self,
        stream: &MediaStream,
        fallback_size: Option<FrameSize>,
    ) -> Result<usize> {
        let index = self.add_stream(stream, stream.codec.parameters().clone(), stream.time_base)?;

        if let Some(size) = fallback_size {
            // SAFETY: the stream was just added and owns its codecpar.
            unsafe {
                let st = self.stream_ptr(index)?;
                fill_missing_size(&mut *(*st).codecpar, size);
            }
        }

        Ok(index)
    }

    /**
        Add a stream fed by an encoder.
    */
    pub fn add_encoded_stream(
        &mut self,
        stream: &MediaStream,
        parameters: codec::Parameters,
        time_base: Rational,
    ) -> Result<usize> {
        self.add_stream(stream, parameters, time_base)
    }

    fn add_stream(
        &mut self,
        stream: &MediaStream,
        parameters: codec::Parameters,
        time_base: Rational,
    ) -> Result<usize> {
        if self.header_written {
            return Err(Error::mux("streams must be added before the header"));
        }

        let mut ost = self
            .output
            .add_stream(ffmpeg_next::encoder::find(codec::Id::None))
            .map_err(|e| Error::mux(format!("adding stream for input {}: {e}", stream.index)))?;

        ost.set_parameters(parameters);
        ost.set_time_base(ffmpeg_next::Rational::from(time_base));
        ost.set_metadata(dictionary(&stream.metadata));

        // SAFETY: `ost` borrows the stream just added to our context.
        unsafe {
            let st = ost.as_mut_ptr();
            (*st).disposition = stream.disposition.bits();
            (*st).discard = stream.discard.into();
            (*st).sample_aspect_ratio = ffmpeg_next::Rational::from(stream.sample_aspect_ratio).into();
            if let Some(rate) = stream.avg_frame_rate {
                (*st).avg_frame_rate = ffmpeg_next::Rational::from(rate).into();
            }
            if let Some(rate) = stream.real_frame_rate {
                (*st).r_frame_rate = ffmpeg_next::Rational::from(rate).into();
            }
            // Let the muxer pick a tag valid for this container.
            (*(*st).codecpar).codec_tag = 0;
        }

        let index = ost.index();
        if index != stream.index {
            warn!(input = stream.index, output = index, "output stream index differs from input");
        }
        self.time_bases.push(time_base);

        debug!(
            input = stream.index,
            output = index,
            kind = %stream.kind,
            codec = %stream.codec_name,
            "mapped stream"
        );

        Ok(index)
    }

    fn stream_ptr(&mut self, index: usize) -> Result<*mut ffi::AVStream> {
        let mut ost = self
            .output
            .stream_mut(index)
            .ok_or_else(|| Error::mux(format!("no output stream {index}")))?;
        // SAFETY: the pointer stays valid as long as the output context.
        Ok(unsafe { ost.as_mut_ptr() })
    }

    /**
        Write the container header.

        Stream time bases are read back afterwards, since the muxer may
        replace the ones requested.
    */
    pub fn write_header(&mut self) -> Result<()> {
        self.output
            .write_header()
            .map_err(|e| Error::mux(format!("failed to write header: {e}")))?;
        self.header_written = true;

        self.time_bases = self
            .output
            .streams()
            .map(|stream| Rational::from(stream.time_base()))
            .collect();

        debug!(path = %self.path.display(), streams = self.time_bases.len(), "wrote header");
        Ok(())
    }

    /**
        Time base of an output stream (final once the header is written).
    */
    pub fn stream_time_base(&self, index: usize) -> Option<Rational> {
        self.time_bases.get(index).copied()
    }

    /**
        Rescale a packet to its output stream's time base and write it,
        interleaving with other streams.
    */
    pub fn write_packet(&mut self, mut packet: Packet) -> Result<()> {
        if !self.header_written {
            return Err(Error::mux("header not written"));
        }

        let index = packet.stream_index();
        let time_base = self
            .time_bases
            .get(index)
            .copied()
            .ok_or_else(|| Error::mux(format!("no output stream {index}")))?;

        packet.rescale_to(time_base);
        let inner = packet.as_ffmpeg_mut();
        inner.set_stream(index);
        inner.set_position(-1);

        inner
            .write_interleaved(&mut self.output)
            .map_err(|e| Error::mux(format!("failed to write packet for stream {index}: {e}")))
    }

    /**
        Finish the container. Only the first call writes anything.

        This writes any trailing metadata (duration, seeking index) and
        finalizes the container. The file may be corrupt if this is not called.
    */
    pub fn write_trailer(&mut self) -> Result<()> {
        if !self.header_written {
            return Err(Error::mux("header not written"));
        }
        if self.trailer_written {
            return Ok(());
        }

        self.output
            .write_trailer()
            .map_err(|e| Error::mux(format!("failed to write trailer: {e}")))?;
        self.trailer_written = true;

        debug!(path = %self.path.display(), "wrote trailer");
        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        self.trailer_written
    }
}

fn dictionary(pairs: &[(String, String)]) -> Dictionary<'static> {
    let mut dict = Dictionary::new();
    for (key, value) in pairs {
        dict.set(key, value);
    }
    dict
}

impl std::fmt::Debug for Sink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sink")
            .field("path", &self.path)
            .field("streams", &self.time_bases.len())
            .field("header_written", &self.header_written)
            .field("trailer_written", &self.trailer_written)
            .finish_non_exhaustive()
    }
}

/**
    Give a video stream with no coded size the fallback size. Returns
    whether anything changed.
*/
fn fill_missing_size(par: &mut ffi::AVCodecParameters, size: FrameSize) -> bool {
    if size.is_empty()
        || par.codec_type != ffi::AVMediaType::AVMEDIA_TYPE_VIDEO
        || (par.width != 0 && par.height != 0)
    {
        return false;
    }
    par.width = size.width as i32;
    par.height = size.height as i32;
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_container_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let err = Sink::open(dir.path().join("out.notacontainer")).unwrap_err();
        assert!(matches!(err, Error::OpenOutputFailed { .. }));
    }

    #[test]
    fn mp4_wants_global_headers() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Sink::open(dir.path().join("out.mp4")).unwrap().needs_global_header());
        assert!(!Sink::open(dir.path().join("out.ts")).unwrap().needs_global_header());
    }

    #[test]
    fn packets_and_trailer_need_a_header() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = Sink::open(dir.path().join("out.mkv")).unwrap();
        let packet = Packet::new(ffmpeg_next::Packet::empty(), 0, Rational::new(1, 1000));
        assert!(matches!(sink.write_packet(packet), Err(Error::MuxWriteFailed(_))));
        assert!(matches!(sink.write_trailer(), Err(Error::MuxWriteFailed(_))));
        assert!(!sink.is_finished());
    }

    #[test]
    fn cover_art_without_a_size_takes_the_fallback() {
        let mut params = codec::Parameters::new();
        // SAFETY: `params` owns a freshly allocated codecpar.
        let par = unsafe { &mut *params.as_mut_ptr() };
        par.codec_type = ffi::AVMediaType::AVMEDIA_TYPE_VIDEO;

        assert!(!fill_missing_size(par, FrameSize::new(0, 0)));
        assert!(fill_missing_size(par, FrameSize::new(640, 360)));
        assert_eq!((par.width, par.height), (640, 360));

        // A coded size is never replaced.
        assert!(!fill_missing_size(par, FrameSize::new(320, 240)));
        assert_eq!((par.width, par.height), (640, 360));

        par.codec_type = ffi::AVMediaType::AVMEDIA_TYPE_ATTACHMENT;
        par.width = 0;
        assert!(!fill_missing_size(par, FrameSize::new(320, 240)));
    }
}
