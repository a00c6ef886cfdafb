/*!
    Conversion utilities between ffmpeg-next types and ffmpeg-types.
*/

use ffmpeg_next::DictionaryRef;

use ffmpeg_types::Rational;

/**
    Copy a metadata dictionary into an ordered list of pairs.
*/
pub fn metadata_pairs(dict: &DictionaryRef<'_>) -> Vec<(String, String)> {
    dict.iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

/**
    Short codec name as FFmpeg spells it, e.g. `h264`.
*/
pub fn codec_name(id: ffmpeg_next::codec::Id) -> String {
    id.name().to_string()
}

/**
    Convert an FFmpeg rational, mapping unknown values (`0/x`) to `None`.
*/
pub fn known_rational(r: ffmpeg_next::Rational) -> Option<Rational> {
    let r = Rational::from(r);
    r.is_valid().then_some(r)
}

pub fn lookup<'a>(metadata: &'a [(String, String)], key: &str) -> Option<&'a str> {
    metadata
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_rationals_are_none() {
        assert_eq!(known_rational(ffmpeg_next::Rational::new(0, 1)), None);
        assert_eq!(
            known_rational(ffmpeg_next::Rational::new(25, 1)),
            Some(Rational::new(25, 1))
        );
    }

    #[test]
    fn lookup_ignores_key_case() {
        let metadata = vec![
            ("LANGUAGE".to_string(), "eng".to_string()),
            ("title".to_string(), "Commentary".to_string()),
        ];
        assert_eq!(lookup(&metadata, "language"), Some("eng"));
        assert_eq!(lookup(&metadata, "Title"), Some("Commentary"));
        assert_eq!(lookup(&metadata, "handler_name"), None);
    }

    #[test]
    fn codec_names_match_ffmpeg_spelling() {
        assert_eq!(codec_name(ffmpeg_next::codec::Id::H264), "h264");
        assert_eq!(codec_name(ffmpeg_next::codec::Id::AAC), "aac");
    }
}
