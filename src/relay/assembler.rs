//! Incremental frame extraction from an upstream byte stream.

use bytes::{Buf, Bytes, BytesMut};

use crate::camera::CameraKind;

/// Delimiter prefix scanned for when the upstream declares no boundary token.
const BARE_DELIMITER: &[u8] = b"\r\n--";

/// Pulls complete frames out of upstream bytes.
///
/// Multipart mode scans for the inter-part delimiter and emits whatever sits
/// in front of each hit; still mode treats every push as one whole frame.
/// Frames are opaque: bytes between delimiters (including any part headers
/// the camera wrote) are forwarded untouched.
#[derive(Debug)]
pub struct FrameAssembler {
    buf: BytesMut,
    delimiter: Vec<u8>,
    whole_buffer: bool,
    /// Everything before this offset is known delimiter-free.
    scanned: usize,
}

impl FrameAssembler {
    /// Assembler for a camera of `kind`, given the content type the upstream
    /// declared (if any).
    pub fn new(kind: CameraKind, content_type: Option<&str>) -> Self {
        let delimiter = match content_type.and_then(boundary_token) {
            // Scanning for the declared token keeps a JPEG that happens to
            // contain the bare byte sequence from being split mid-image.
            Some(token) => {
                let mut delimiter = BARE_DELIMITER.to_vec();
                delimiter.extend_from_slice(token.as_bytes());
                delimiter
            }
            // Fallback for cameras that omit the boundary parameter. This
            // can mis-split a payload containing the bare sequence.
            None => BARE_DELIMITER.to_vec(),
        };
        Self {
            buf: BytesMut::new(),
            delimiter,
            whole_buffer: kind.is_still(),
            scanned: 0,
        }
    }

    /// Append one upstream chunk and collect every completed frame into
    /// `out`, in arrival order.
    pub fn push(&mut self, chunk: &[u8], out: &mut Vec<Bytes>) {
        self.buf.extend_from_slice(chunk);
        if self.whole_buffer {
            // A still camera pushes complete images; each push is one frame
            // and nothing is retained.
            out.push(self.buf.split().freeze());
            self.scanned = 0;
            return;
        }
        loop {
            match find(&self.buf[self.scanned..], &self.delimiter) {
                Some(offset) => {
                    let frame = self.buf.split_to(self.scanned + offset).freeze();
                    self.buf.advance(self.delimiter.len());
                    self.scanned = 0;
                    if !frame.is_empty() {
                        out.push(frame);
                    }
                }
                None => {
                    // Keep one delimiter's worth of tail unscanned so a
                    // marker split across chunks is still found next push.
                    self.scanned = self.buf.len().saturating_sub(self.delimiter.len() - 1);
                    break;
                }
            }
        }
    }

    /// Bytes buffered awaiting a delimiter.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

/// Extract the `boundary=` parameter from a multipart content type. The
/// token is kept verbatim (minus quotes) so dash-prefixed declarations still
/// match their on-wire form.
pub fn boundary_token(content_type: &str) -> Option<String> {
    for param in content_type.split(';').skip(1) {
        let param = param.trim();
        if let (Some(prefix), Some(value)) = (param.get(..9), param.get(9..)) {
            if prefix.eq_ignore_ascii_case("boundary=") {
                let token = value.trim().trim_matches('"');
                if !token.is_empty() {
                    return Some(token.to_string());
                }
            }
        }
    }
    None
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
