/*!
    Opaque codec configuration for passing to decoders and muxers.
*/

use ffmpeg_next::codec;

/**
    Codec parameters extracted from a source stream.

    Holds its own copy of the parameters, so it stays valid after the
    demuxer that produced it is closed. Decoders are created from it and
    pass-through streams copy it byte-for-byte into the output.
*/
pub struct CodecConfig {
    parameters: codec::Parameters,
}

impl CodecConfig {
    pub(crate) fn new(parameters: codec::Parameters) -> Self {
        Self { parameters }
    }

    pub fn id(&self) -> codec::Id {
        self.parameters.id()
    }

    pub fn medium(&self) -> ffmpeg_next::media::Type {
        self.parameters.medium()
    }

    /**
        Borrow the raw parameters.
    */
    pub fn parameters(&self) -> &codec::Parameters {
        &self.parameters
    }

    pub fn into_parameters(self) -> codec::Parameters {
        self.parameters
    }
}

impl Clone for CodecConfig {
    fn clone(&self) -> Self {
        Self {
            parameters: self.parameters.clone(),
        }
    }
}

impl std::fmt::Debug for CodecConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecConfig")
            .field("codec_id", &self.parameters.id())
            .finish_non_exhaustive()
    }
}
