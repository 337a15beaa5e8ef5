//! Image type and size detection from file headers.
//!
//! Uploads are classified by their magic bytes. The content type a browser
//! claims for a multipart field is never trusted.

/// Image formats accepted for post attachments and avatars.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Png,
    Jpeg,
    Gif,
}

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

impl MediaKind {
    pub fn sniff(data: &[u8]) -> Option<Self> {
        if data.starts_with(PNG_SIGNATURE) {
            Some(MediaKind::Png)
        } else if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(MediaKind::Jpeg)
        } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
            Some(MediaKind::Gif)
        } else {
            None
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            MediaKind::Png => "png",
            MediaKind::Jpeg => "jpg",
            MediaKind::Gif => "gif",
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            MediaKind::Png => "image/png",
            MediaKind::Jpeg => "image/jpeg",
            MediaKind::Gif => "image/gif",
        }
    }

    /// Pixel width and height read from the image header.
    pub fn dimensions(self, data: &[u8]) -> Option<(u32, u32)> {
        match self {
            MediaKind::Png => png_dimensions(data),
            MediaKind::Gif => gif_dimensions(data),
            MediaKind::Jpeg => jpeg_dimensions(data),
        }
    }
}

fn be_u16(data: &[u8], at: usize) -> Option<u32> {
    let bytes = data.get(at..at + 2)?;
    Some(u32::from(u16::from_be_bytes([bytes[0], bytes[1]])))
}

fn png_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    // IHDR is always the first chunk
    if data.get(12..16)? != b"IHDR" {
        return None;
    }
    let width = u32::from_be_bytes(data.get(16..20)?.try_into().ok()?);
    let height = u32::from_be_bytes(data.get(20..24)?.try_into().ok()?);
    Some((width, height))
}

fn gif_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    let screen = data.get(6..10)?;
    let width = u16::from_le_bytes([screen[0], screen[1]]);
    let height = u16::from_le_bytes([screen[2], screen[3]]);
    Some((u32::from(width), u32::from(height)))
}

fn jpeg_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    let mut pos = 2;
    loop {
        while *data.get(pos)? != 0xFF {
            pos += 1;
        }
        while *data.get(pos)? == 0xFF {
            pos += 1;
        }
        let marker = *data.get(pos)?;
        pos += 1;

        match marker {
            // standalone markers carry no length
            0x01 | 0xD0..=0xD8 => continue,
            0xD9 | 0xDA => return None,
            0xC0..=0xCF if !matches!(marker, 0xC4 | 0xC8 | 0xCC) => {
                let height = be_u16(data, pos + 3)?;
                let width = be_u16(data, pos + 5)?;
                return Some((width, height));
            }
            _ => {
                let len = be_u16(data, pos)? as usize;
                if len < 2 {
                    return None;
                }
                pos += len;
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    /// Minimal PNG header with an IHDR chunk.
    pub fn png(width: u32, height: u32) -> Vec<u8> {
        let mut data = super::PNG_SIGNATURE.to_vec();
        data.extend_from_slice(&13u32.to_be_bytes());
        data.extend_from_slice(b"IHDR");
        data.extend_from_slice(&width.to_be_bytes());
        data.extend_from_slice(&height.to_be_bytes());
        data.extend_from_slice(&[8, 6, 0, 0, 0]);
        data
    }

    pub fn gif(width: u16, height: u16) -> Vec<u8> {
        let mut data = b"GIF89a".to_vec();
        data.extend_from_slice(&width.to_le_bytes());
        data.extend_from_slice(&height.to_le_bytes());
        data.extend_from_slice(&[0, 0, 0]);
        data
    }

    /// SOI, an APP0 segment, then a baseline SOF0 frame header.
    pub fn jpeg(width: u16, height: u16) -> Vec<u8> {
        let mut data = vec![0xFF, 0xD8];
        data.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x10]);
        data.extend_from_slice(b"JFIF\0\x01\x01\0\0\x01\0\x01\0\0");
        data.extend_from_slice(&[0xFF, 0xC0, 0x00, 0x11, 0x08]);
        data.extend_from_slice(&height.to_be_bytes());
        data.extend_from_slice(&width.to_be_bytes());
        data.extend_from_slice(&[0x03, 0x01, 0x22, 0x00, 0x02, 0x11, 0x01, 0x03, 0x11, 0x01]);
        data
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures;
    use super::*;

    #[test]
    fn sniffs_known_formats() {
        assert_eq!(MediaKind::sniff(&fixtures::png(1, 1)), Some(MediaKind::Png));
        assert_eq!(MediaKind::sniff(&fixtures::gif(1, 1)), Some(MediaKind::Gif));
        assert_eq!(MediaKind::sniff(&fixtures::jpeg(1, 1)), Some(MediaKind::Jpeg));
    }

    #[test]
    fn rejects_unknown_bytes() {
        assert_eq!(MediaKind::sniff(b"<svg xmlns=...>"), None);
        assert_eq!(MediaKind::sniff(b""), None);
    }

    #[test]
    fn reads_png_dimensions() {
        let data = fixtures::png(640, 480);
        assert_eq!(MediaKind::Png.dimensions(&data), Some((640, 480)));
    }

    #[test]
    fn reads_gif_dimensions() {
        let data = fixtures::gif(400, 401);
        assert_eq!(MediaKind::Gif.dimensions(&data), Some((400, 401)));
    }

    #[test]
    fn reads_jpeg_dimensions_past_app_segments() {
        let data = fixtures::jpeg(1024, 768);
        assert_eq!(MediaKind::Jpeg.dimensions(&data), Some((1024, 768)));
    }

    #[test]
    fn truncated_headers_have_no_dimensions() {
        let data = fixtures::png(10, 10);
        assert_eq!(MediaKind::Png.dimensions(&data[..18]), None);
        assert_eq!(MediaKind::Jpeg.dimensions(&[0xFF, 0xD8, 0xFF, 0xE0]), None);
    }
}
