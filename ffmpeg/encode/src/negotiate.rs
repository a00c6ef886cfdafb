/*!
    Matching requested and inherited parameters against what an encoder supports.

    Codecs advertise optional lists of supported pixel formats, sample
    formats, sample rates, channel layouts and profiles. A missing list means
    anything goes. Values the caller asked for explicitly must be supported;
    values inherited from the decoded stream are replaced with a supported
    one, and the filter graph converts to it.
*/

use std::fmt::Debug;

use ffmpeg_types::{Error, Result, channel_layout};

fn unsupported(codec: &str, parameter: &'static str, value: String) -> Error {
    Error::UnsupportedParameter {
        codec: codec.to_string(),
        parameter,
        value,
    }
}

/**
    Pick a value for `parameter`.

    `requested` must appear in `supported`. Otherwise `inherited` is kept
    when supported, else the codec's first supported value is used.
*/
pub fn negotiate<T: Copy + PartialEq + Debug>(
    codec: &str,
    parameter: &'static str,
    requested: Option<T>,
    inherited: T,
    supported: Option<&[T]>,
) -> Result<T> {
    let Some(supported) = supported.filter(|s| !s.is_empty()) else {
        return Ok(requested.unwrap_or(inherited));
    };

    if let Some(value) = requested {
        return if supported.contains(&value) {
            Ok(value)
        } else {
            Err(unsupported(codec, parameter, format!("{value:?}")))
        };
    }

    if supported.contains(&inherited) {
        Ok(inherited)
    } else {
        Ok(supported[0])
    }
}

/**
    Sample rate closest to `inherited` among `supported`.
*/
pub fn nearest_rate(inherited: u32, supported: Option<&[u32]>) -> u32 {
    match supported {
        Some(rates) if !rates.is_empty() => rates
            .iter()
            .copied()
            .min_by_key(|rate| rate.abs_diff(inherited))
            .unwrap_or(inherited),
        _ => inherited,
    }
}

/**
    Pick an output channel layout, by description.

    An inherited layout the codec lacks is replaced with a supported layout
    of the same channel count when there is one.
*/
pub fn choose_layout(
    codec: &str,
    requested: Option<&str>,
    inherited: &str,
    supported: Option<&[String]>,
) -> Result<String> {
    let same = |a: &str, b: &str| a.trim().eq_ignore_ascii_case(b.trim());

    if let Some(name) = requested {
        if channel_layout::channel_count(name).is_none() {
            return Err(unsupported(codec, "channel layout", name.to_string()));
        }
    }

    let Some(supported) = supported.filter(|s| !s.is_empty()) else {
        return Ok(requested.unwrap_or(inherited).to_string());
    };

    if let Some(name) = requested {
        return supported
            .iter()
            .find(|s| same(s, name))
            .cloned()
            .ok_or_else(|| unsupported(codec, "channel layout", name.to_string()));
    }

    if let Some(found) = supported.iter().find(|s| same(s, inherited)) {
        return Ok(found.clone());
    }

    let channels = channel_layout::channel_count(inherited);
    let by_count = channels.and_then(|count| {
        supported
            .iter()
            .find(|s| channel_layout::channel_count(s) == Some(count))
    });
    Ok(by_count.unwrap_or(&supported[0]).clone())
}

/**
    Resolve a profile name to the codec's profile id.
*/
pub fn resolve_profile(codec: &str, name: &str, supported: &[(i32, String)]) -> Result<i32> {
    supported
        .iter()
        .find(|(_, profile)| profile.eq_ignore_ascii_case(name.trim()))
        .map(|(id, _)| *id)
        .ok_or_else(|| unsupported(codec, "profile", name.to_string()))
}
