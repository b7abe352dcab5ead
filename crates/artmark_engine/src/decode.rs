use std::sync::LazyLock;

use chardetng::EncodingDetector;
use encoding_rs::Encoding;
use regex::bytes::Regex;

/// How many leading bytes are searched for a `<meta charset>` declaration.
const META_SCAN_LIMIT: usize = 1024;

static META_CHARSET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta[^>]+charset\s*=\s*["']?([A-Za-z0-9_.:\-]+)"#)
        .expect("meta charset pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharsetSource {
    Bom,
    Header,
    Meta,
    Detected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPage {
    pub html: String,
    pub encoding_label: String,
    pub source: CharsetSource,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("failed to decode bytes with {encoding}: {message}")]
    DecodeFailure { encoding: String, message: String },
}

/// Decode a fetched page into UTF-8.
///
/// Order: BOM, then the Content-Type charset, then a `<meta>` declaration near
/// the top, then chardetng with the host's top-level domain as a hint.
pub fn decode_page(
    bytes: &[u8],
    content_type: Option<&str>,
    tld: Option<&str>,
) -> Result<DecodedPage, DecodeError> {
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        return decode_with(bytes, encoding, CharsetSource::Bom);
    }

    if let Some(enc) = content_type
        .and_then(header_charset)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
    {
        return decode_with(bytes, enc, CharsetSource::Header);
    }

    if let Some(enc) = meta_charset(bytes) {
        return decode_with(bytes, enc, CharsetSource::Meta);
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let enc = detector.guess(tld.map(str::as_bytes), true);
    decode_with(bytes, enc, CharsetSource::Detected)
}

fn header_charset(content_type: &str) -> Option<String> {
    content_type.split(';').find_map(|part| {
        let (key, value) = part.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim_matches([' ', '"', '\''].as_ref()).to_string())
    })
}

fn meta_charset(bytes: &[u8]) -> Option<&'static Encoding> {
    let head = &bytes[..bytes.len().min(META_SCAN_LIMIT)];
    let label = META_CHARSET.captures(head)?.get(1)?;
    Encoding::for_label(label.as_bytes())
}

fn decode_with(
    bytes: &[u8],
    enc: &'static Encoding,
    source: CharsetSource,
) -> Result<DecodedPage, DecodeError> {
    let (text, _, had_errors) = enc.decode(bytes);
    if had_errors {
        return Err(DecodeError::DecodeFailure {
            encoding: enc.name().to_string(),
            message: "malformed byte sequence".into(),
        });
    }
    Ok(DecodedPage {
        html: text.into_owned(),
        encoding_label: enc.name().to_string(),
        source,
    })
}
