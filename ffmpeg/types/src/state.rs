/*!
    Codec lifecycle state machine.
*/

use crate::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CodecDirection {
    Decoding,
    Encoding,
}

/**
    Lifecycle of a decoder or encoder.

    `Closed -> Open -> Flushing -> Closed`. Input is accepted only while
    open; flushing sends end-of-stream and drains what the codec buffered,
    after which the codec is closed until it is reset.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CodecState {
    Closed,
    Open(CodecDirection),
    Flushing(CodecDirection),
}

impl CodecState {
    pub fn is_open(self) -> bool {
        matches!(self, Self::Open(_))
    }

    /**
        Transition `Closed -> Open`.
    */
    pub fn open(&mut self, direction: CodecDirection) -> Result<()> {
        match *self {
            Self::Closed => {
                *self = Self::Open(direction);
                Ok(())
            }
            other => Err(Error::invalid_data(format!("cannot open codec in state {other:?}"))),
        }
    }

    /**
        Fail unless the codec currently accepts input.
    */
    pub fn ensure_open(self) -> Result<()> {
        match self {
            Self::Open(_) => Ok(()),
            other => Err(Error::invalid_data(format!(
                "codec does not accept input in state {other:?}"
            ))),
        }
    }

    /**
        Transition `Open -> Flushing`.
    */
    pub fn begin_flush(&mut self) -> Result<()> {
        match *self {
            Self::Open(direction) => {
                *self = Self::Flushing(direction);
                Ok(())
            }
            other => Err(Error::invalid_data(format!("cannot flush codec in state {other:?}"))),
        }
    }

    /**
        Transition `Flushing -> Closed`.
    */
    pub fn finish_flush(&mut self) {
        if let Self::Flushing(_) = self {
            *self = Self::Closed;
        }
    }

    /**
        Return to `Open` after buffers were discarded, e.g. following a seek.
    */
    pub fn reset(&mut self, direction: CodecDirection) {
        *self = Self::Open(direction);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_lifecycle() {
        let mut state = CodecState::Closed;
        state.open(CodecDirection::Encoding).unwrap();
        assert!(state.is_open());
        state.ensure_open().unwrap();

        state.begin_flush().unwrap();
        assert_eq!(state, CodecState::Flushing(CodecDirection::Encoding));
        assert!(state.ensure_open().is_err());

        state.finish_flush();
        assert_eq!(state, CodecState::Closed);
    }

    #[test]
    fn closed_codec_rejects_input_and_flush() {
        let mut state = CodecState::Closed;
        assert!(state.ensure_open().is_err());
        assert!(state.begin_flush().is_err());
    }

    #[test]
    fn double_open_is_rejected() {
        let mut state = CodecState::Closed;
        state.open(CodecDirection::Decoding).unwrap();
        assert!(state.open(CodecDirection::Decoding).is_err());
    }

    #[test]
    fn reset_reopens_after_flush() {
        let mut state = CodecState::Open(CodecDirection::Decoding);
        state.begin_flush().unwrap();
        state.finish_flush();
        state.reset(CodecDirection::Decoding);
        assert!(state.is_open());
    }

    #[test]
    fn finish_flush_outside_flushing_is_a_no_op() {
        let mut state = CodecState::Open(CodecDirection::Decoding);
        state.finish_flush();
        assert!(state.is_open());
    }
}
