/*!
    Audio sample FIFO between the filter graph and a fixed frame size encoder.
*/

use std::collections::VecDeque;

use ffmpeg_next::{ffi, format::Sample, util::frame::audio::Audio as AudioFrameFFmpeg};

use ffmpeg_types::{Error, Rational, Result, channel_layout};

/**
    Queue of raw samples stored per plane.

    Packed audio uses a single plane whose unit is one sample of every
    channel; planar audio uses one plane per channel.
*/
#[derive(Clone, Debug)]
pub struct SampleFifo {
    planes: Vec<VecDeque<u8>>,
    unit: usize,
    len: usize,
}

impl SampleFifo {
    /**
        FIFO with `planes` planes of `unit` bytes per sample each.
    */
    pub fn new(planes: usize, unit: usize) -> Self {
        Self {
            planes: vec![VecDeque::new(); planes.max(1)],
            unit: unit.max(1),
            len: 0,
        }
    }

    pub fn planes(&self) -> usize {
        self.planes.len()
    }

    /**
        Samples currently queued.
    */
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /**
        Append `samples` samples, taking them from the front of each plane.
    */
    pub fn write(&mut self, planes: &[&[u8]], samples: usize) -> Result<()> {
        let bytes = samples * self.unit;
        if planes.len() != self.planes.len() {
            return Err(Error::invalid_data(format!(
                "expected {} sample planes, got {}",
                self.planes.len(),
                planes.len()
            )));
        }
        if let Some(short) = planes.iter().find(|plane| plane.len() < bytes) {
            return Err(Error::invalid_data(format!(
                "sample plane holds {} bytes, {bytes} needed",
                short.len()
            )));
        }

        for (queue, plane) in self.planes.iter_mut().zip(planes) {
            queue.extend(&plane[..bytes]);
        }
        self.len += samples;
        Ok(())
    }

    /**
        Pop up to `samples` samples into `out`, one buffer per plane.
        Returns how many samples were moved.
    */
    pub fn read_into(&mut self, out: &mut [&mut [u8]], samples: usize) -> usize {
        let samples = samples.min(self.len);
        let bytes = samples * self.unit;
        for (queue, dst) in self.planes.iter_mut().zip(out.iter_mut()) {
            for (d, s) in dst[..bytes].iter_mut().zip(queue.drain(..bytes)) {
                *d = s;
            }
        }
        self.len -= samples;
        samples
    }

    /**
        Pop up to `samples` samples as owned plane buffers.
    */
    pub fn read(&mut self, samples: usize) -> Vec<Vec<u8>> {
        let samples = samples.min(self.len);
        let mut out = vec![vec![0u8; samples * self.unit]; self.planes.len()];
        let mut views: Vec<&mut [u8]> = out.iter_mut().map(Vec::as_mut_slice).collect();
        self.read_into(&mut views, samples);
        out
    }

    pub fn clear(&mut self) {
        self.planes.iter_mut().for_each(VecDeque::clear);
        self.len = 0;
    }
}

/**
    How many samples a drain should take from a FIFO holding `available`.

    Returns `None` when nothing should be drained yet.
*/
pub fn drain_size(available: usize, frame_size: usize, finish: bool) -> Option<usize> {
    if available == 0 {
        return None;
    }
    if frame_size == 0 {
        return Some(available);
    }
    if available >= frame_size {
        Some(frame_size)
    } else if finish {
        Some(available)
    } else {
        None
    }
}

/**
    Regroups filtered audio into frames of the encoder's frame size.

    Drained frames get timestamps from a running sample counter, converted
    from `1/sample_rate` into the configured time base, so output audio is
    continuous regardless of how input frames were cut.
*/
pub struct AudioFifo {
    fifo: SampleFifo,
    format: Sample,
    sample_rate: u32,
    channel_layout: String,
    frame_size: usize,
    pts_time_base: Rational,
    samples_out: i64,
}

impl AudioFifo {
    /**
        FIFO producing frames in the encoder's format.

        `frame_size` 0 means the encoder accepts any size, so every read
        drains what is queued.
    */
    pub fn new(
        format: Sample,
        sample_rate: u32,
        channel_layout: &str,
        frame_size: usize,
        pts_time_base: Rational,
    ) -> Result<Self> {
        let channels = channel_layout::channel_count(channel_layout).ok_or_else(|| {
            Error::invalid_data(format!("unknown channel layout '{channel_layout}'"))
        })? as usize;
        if sample_rate == 0 {
            return Err(Error::invalid_data("audio FIFO needs a sample rate"));
        }

        let (planes, unit) = if format.is_planar() {
            (channels, format.bytes())
        } else {
            (1, format.bytes() * channels)
        };

        Ok(Self {
            fifo: SampleFifo::new(planes, unit),
            format,
            sample_rate,
            channel_layout: channel_layout.to_string(),
            frame_size,
            pts_time_base,
            samples_out: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.fifo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fifo.is_empty()
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /**
        Queue every sample of `frame`.
    */
    pub fn write(&mut self, frame: &AudioFrameFFmpeg) -> Result<()> {
        if frame.format() != self.format {
            return Err(Error::invalid_data(format!(
                "FIFO expects {} samples, got {}",
                self.format.name(),
                frame.format().name()
            )));
        }
        let channels = frame.channels() as usize;
        let expected = channel_layout::channel_count(&self.channel_layout).unwrap_or(0) as usize;
        if channels != expected {
            return Err(Error::invalid_data(format!(
                "FIFO expects {expected} channels, got {channels}"
            )));
        }

        let samples = frame.samples();
        let bytes = samples * self.fifo.unit;
        let mut planes: Vec<&[u8]> = Vec::with_capacity(self.fifo.planes());
        // SAFETY: only `linesize[0]` is set for audio, so planes are read
        // through `extended_data`, which holds one pointer per plane of at
        // least `samples` samples each. The channel count was checked above.
        unsafe {
            let ptr = frame.as_ptr();
            for plane in 0..self.fifo.planes() {
                let data = *(*ptr).extended_data.add(plane);
                if data.is_null() {
                    return Err(Error::invalid_data(format!("audio plane {plane} is missing")));
                }
                planes.push(std::slice::from_raw_parts(data, bytes));
            }
        }
        self.fifo.write(&planes, samples)
    }

    /**
        Take the next frame.

        Without `finish`, returns `None` until a full frame is queued. With
        `finish`, a final short frame drains the remainder.
    */
    pub fn read(&mut self, finish: bool) -> Result<Option<AudioFrameFFmpeg>> {
        let Some(samples) = drain_size(self.fifo.len(), self.frame_size, finish) else {
            return Ok(None);
        };

        let mut frame = AudioFrameFFmpeg::empty();
        frame.set_format(self.format);
        frame.set_rate(self.sample_rate);
        frame.set_samples(samples);
        // SAFETY: the frame is freshly allocated and owned here; its layout
        // is assigned before buffers are requested.
        unsafe {
            let ptr = frame.as_mut_ptr();
            channel_layout::assign(&mut (*ptr).ch_layout, &self.channel_layout)?;
            let ret = ffi::av_frame_get_buffer(ptr, 0);
            if ret < 0 {
                return Err(Error::codec(format!(
                    "allocating audio frame: {}",
                    ffmpeg_next::Error::from(ret)
                )));
            }
        }

        let planes = self.fifo.planes();
        let mut frame_planes: Vec<&mut [u8]> = Vec::with_capacity(planes);
        // SAFETY: each plane pointer was just allocated for `samples` samples
        // of `unit` bytes and the planes do not overlap.
        unsafe {
            let ptr = frame.as_mut_ptr();
            let bytes = samples * self.fifo.unit;
            for plane in 0..planes {
                let data = *(*ptr).extended_data.add(plane);
                frame_planes.push(std::slice::from_raw_parts_mut(data, bytes));
            }
        }
        self.fifo.read_into(&mut frame_planes, samples);

        let pts = Rational::new(1, self.sample_rate as i32).rescale(self.samples_out, self.pts_time_base);
        frame.set_pts(Some(pts));
        self.samples_out += samples as i64;

        Ok(Some(frame))
    }

    /**
        Samples handed out so far.
    */
    pub fn samples_out(&self) -> i64 {
        self.samples_out
    }
}

impl std::fmt::Debug for AudioFifo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioFifo")
            .field("format", &self.format)
            .field("sample_rate", &self.sample_rate)
            .field("channel_layout", &self.channel_layout)
            .field("frame_size", &self.frame_size)
            .field("queued", &self.fifo.len())
            .field("samples_out", &self.samples_out)
            .finish()
    }
}
