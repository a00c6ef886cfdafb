/*!
    Media output and muxing for the ffmpeg transcoding crates.

    This crate handles the output side of the pipeline. It mirrors the
    streams of an input into a new container, either copying their codec
    parameters for pass-through or taking them from an encoder, copies
    container metadata and chapters, and writes packets interleaved in the
    time base each output stream ended up with.

    ```ignore
    let mut sink = Sink::open("out.mkv")?;
    sink.set_metadata(&source.metadata());
    for stream in source.streams() {
        sink.add_passthrough_stream(stream, None)?;
    }
    sink.write_header()?;
    while let Some(packet) = source.read_packet()? {
        sink.write_packet(packet)?;
    }
    sink.write_trailer()?;
    ```
*/

mod sink;

pub use sink::Sink;
